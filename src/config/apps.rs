//! App display names to Android package ids, used by `open_app`.

use once_cell::sync::Lazy;
use std::collections::HashMap;

/// Mapping from app display names to Android package names.
pub static APP_PACKAGES: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    let mut m = HashMap::new();

    // Short video
    m.insert("抖音", "com.ss.android.ugc.aweme");
    m.insert("抖音极速版", "com.ss.android.ugc.aweme.lite");
    m.insert("快手", "com.smile.gifmaker");
    m.insert("快手极速版", "com.kuaishou.nebula");
    m.insert("bilibili", "tv.danmaku.bili");
    m.insert("哔哩哔哩", "tv.danmaku.bili");
    m.insert("TikTok", "com.zhiliaoapp.musically");

    // Messaging
    m.insert("微信", "com.tencent.mm");
    m.insert("QQ", "com.tencent.mobileqq");
    m.insert("微博", "com.sina.weibo");
    m.insert("飞书", "com.ss.android.lark");

    // Shopping & services
    m.insert("淘宝", "com.taobao.taobao");
    m.insert("京东", "com.jingdong.app.mall");
    m.insert("拼多多", "com.xunmeng.pinduoduo");
    m.insert("美团", "com.sankuai.meituan");
    m.insert("饿了么", "me.ele");
    m.insert("小红书", "com.xingin.xhs");

    // Maps & travel
    m.insert("高德地图", "com.autonavi.minimap");
    m.insert("百度地图", "com.baidu.BaiduMap");
    m.insert("携程", "ctrip.android.view");
    m.insert("12306", "com.MobileTicket");

    // Media
    m.insert("网易云音乐", "com.netease.cloudmusic");
    m.insert("QQ音乐", "com.tencent.qqmusic");
    m.insert("今日头条", "com.ss.android.article.news");

    // System
    m.insert("Settings", "com.android.settings");
    m.insert("设置", "com.android.settings");
    m.insert("Chrome", "com.android.chrome");
    m.insert("Gmail", "com.google.android.gm");
    m.insert("YouTube", "com.google.android.youtube");
    m.insert("Google Maps", "com.google.android.apps.maps");

    m
});

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_package_ids_look_valid() {
        for (name, package) in APP_PACKAGES.iter() {
            assert!(package.contains('.'), "{} -> {}", name, package);
        }
    }
}
