//! Parsing of `Thought: … / Action: …` model replies.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use super::coordinates::Point;

static THOUGHT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)Thought:\s*(.*?)\nAction:").expect("valid regex"));

static ACTION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"Action:\s*([^\n]*)").expect("valid regex"));

static BARE_ACTION_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"\b(click|left_single|left_double|right_single|long_press|hover|drag|scroll|type|press_home|press_back|finished|open_app|wait)\s*\(",
    )
    .expect("valid regex")
});

static BOX_TOKEN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<\|box_start\|>|<\|box_end\|>").expect("valid regex"));

static BOX_VALUE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(start_box|end_box)='(\([^']*\))'").expect("valid regex"));

static NUMBER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"-?\d+(?:\.\d+)?").expect("valid regex"));

/// Action parsing errors.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    #[error("No action found in response: {0}")]
    NoAction(String),
    #[error("Malformed action: {0}")]
    Malformed(String),
    #[error("Unknown action: {0}")]
    UnknownAction(String),
    #[error("Action `{action}` is missing parameter `{param}`")]
    MissingParameter { action: String, param: String },
    #[error("Invalid coordinates: {0}")]
    InvalidCoordinates(String),
    #[error("Invalid scroll direction: {0}")]
    InvalidDirection(String),
}

/// Thought and action text extracted from a reply.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedResponse {
    pub thought: String,
    pub action: String,
}

/// Remove `<|box_start|>` / `<|box_end|>` markers.
pub fn strip_box_tokens(text: &str) -> String {
    BOX_TOKEN_RE.replace_all(text, "").into_owned()
}

/// Wrap the coordinate values of a reply's action in box tokens before the
/// reply is replayed as history.
pub fn add_box_token(response: &str) -> String {
    match response.split_once("Action:") {
        Some((head, tail)) if tail.contains("start_box=") => {
            let tail = BOX_VALUE_RE.replace_all(tail, "$1='<|box_start|>$2<|box_end|>'");
            format!("{}Action:{}", head, tail)
        }
        _ => response.to_string(),
    }
}

/// Split a model reply into its thought and action.
pub fn parse_response(text: &str) -> ParsedResponse {
    let thought = THOUGHT_RE
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .unwrap_or_default();

    let mut action = ACTION_RE
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .unwrap_or_default();

    if action.is_empty() {
        if let Some(call) = find_bare_call(text) {
            action = call.to_string();
        }
    }

    ParsedResponse {
        thought,
        action: strip_box_tokens(&action).trim().to_string(),
    }
}

/// Find the first known action call anywhere in `text`, with balanced parentheses.
fn find_bare_call(text: &str) -> Option<&str> {
    let m = BARE_ACTION_RE.find(text)?;
    let open = m.end() - 1;
    let close = matching_paren(text, open)?;
    Some(&text[m.start()..=close])
}

/// Byte index of the `)` closing the `(` at `open`, skipping quoted text.
fn matching_paren(text: &str, open: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut escaped = false;

    for (i, c) in text[open..].char_indices() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '\'' | '"' => quote = Some(c),
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 0 {
                    return Some(open + i);
                }
            }
            _ => {}
        }
    }
    None
}

/// Scroll direction, named after where the content should move into view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScrollDirection {
    Up,
    Down,
    Left,
    Right,
}

impl fmt::Display for ScrollDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ScrollDirection::Up => "up",
            ScrollDirection::Down => "down",
            ScrollDirection::Left => "left",
            ScrollDirection::Right => "right",
        };
        write!(f, "{}", s)
    }
}

/// An action in model coordinates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Action {
    Click { point: Point },
    DoubleClick { point: Point },
    LongPress { point: Point },
    Hover { point: Point },
    Drag { start: Point, end: Point },
    Scroll { point: Option<Point>, direction: ScrollDirection },
    Type { content: String },
    OpenApp { app_name: String },
    Home,
    Back,
    Wait,
    Finished { content: Option<String> },
}

/// Arguments of a call, in order. Positional arguments have no key.
struct CallArgs {
    action: String,
    args: Vec<(Option<String>, String)>,
}

impl CallArgs {
    /// Look up a keyword argument by any of its aliases, falling back to the
    /// first positional argument when `primary` is set.
    fn get(&self, aliases: &[&str], primary: bool) -> Option<&str> {
        self.args
            .iter()
            .find(|(k, _)| k.as_deref().map(|k| aliases.contains(&k)).unwrap_or(false))
            .or_else(|| {
                if primary {
                    self.args.iter().find(|(k, _)| k.is_none())
                } else {
                    None
                }
            })
            .map(|(_, v)| v.as_str())
    }

    fn require(&self, aliases: &[&str], primary: bool) -> Result<&str, ParseError> {
        self.get(aliases, primary)
            .ok_or_else(|| ParseError::MissingParameter {
                action: self.action.clone(),
                param: aliases[0].to_string(),
            })
    }

    fn point(&self, aliases: &[&str], primary: bool) -> Result<Point, ParseError> {
        parse_point(self.require(aliases, primary)?)
    }
}

const START_KEYS: &[&str] = &["start_box", "start_point", "point"];
const END_KEYS: &[&str] = &["end_box", "end_point"];
const CONTENT_KEYS: &[&str] = &["content", "text"];
const APP_KEYS: &[&str] = &["app_name", "app"];
const DIRECTION_KEYS: &[&str] = &["direction"];

/// Parse an action call such as `click(start_box='(100,200)')`.
pub fn parse_action(text: &str) -> Result<Action, ParseError> {
    let text = strip_box_tokens(text);
    let text = text.trim();
    if text.is_empty() {
        return Err(ParseError::NoAction(String::new()));
    }

    let call = split_call(text)?;
    let name = call.action.as_str();

    let action = match name {
        "click" | "left_single" => Action::Click {
            point: call.point(START_KEYS, true)?,
        },
        "left_double" => Action::DoubleClick {
            point: call.point(START_KEYS, true)?,
        },
        "right_single" | "long_press" => Action::LongPress {
            point: call.point(START_KEYS, true)?,
        },
        "hover" => Action::Hover {
            point: call.point(START_KEYS, true)?,
        },
        "drag" | "select" => Action::Drag {
            start: call.point(START_KEYS, false)?,
            end: call.point(END_KEYS, false)?,
        },
        "scroll" => {
            let point = match call.get(START_KEYS, false) {
                Some(value) => Some(parse_point(value)?),
                None => None,
            };
            let direction = parse_direction(call.require(DIRECTION_KEYS, true)?)?;
            Action::Scroll { point, direction }
        }
        "type" => Action::Type {
            content: call.get(CONTENT_KEYS, true).unwrap_or("").to_string(),
        },
        "open_app" => {
            let app_name = call.require(APP_KEYS, true)?.trim();
            if app_name.is_empty() {
                return Err(ParseError::MissingParameter {
                    action: name.to_string(),
                    param: "app_name".to_string(),
                });
            }
            Action::OpenApp {
                app_name: app_name.to_string(),
            }
        }
        "press_home" => Action::Home,
        "press_back" => Action::Back,
        "wait" => Action::Wait,
        "finished" => Action::Finished {
            content: call
                .get(CONTENT_KEYS, true)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string),
        },
        other => return Err(ParseError::UnknownAction(other.to_string())),
    };

    Ok(action)
}

/// Split `name(args)` into its name and arguments.
fn split_call(text: &str) -> Result<CallArgs, ParseError> {
    let Some(open) = text.find('(') else {
        // Zero-argument actions are sometimes written without parentheses.
        if text.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Ok(CallArgs {
                action: text.to_lowercase(),
                args: Vec::new(),
            });
        }
        return Err(ParseError::Malformed(text.to_string()));
    };

    let name = text[..open].trim().to_lowercase();
    if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(ParseError::Malformed(text.to_string()));
    }

    // Models occasionally drop the closing parenthesis; accept the remainder.
    let inner = match matching_paren(text, open) {
        Some(close) => &text[open + 1..close],
        None => text[open + 1..].trim_end_matches(')'),
    };

    Ok(CallArgs {
        action: name,
        args: parse_args(inner),
    })
}

/// Parse `key='value', key2=(1,2)` into ordered pairs.
fn parse_args(content: &str) -> Vec<(Option<String>, String)> {
    let mut args = Vec::new();
    let mut key = String::new();
    let mut value = String::new();
    let mut parsing_key = true;
    let mut quote: Option<char> = None;
    let mut escaped = false;
    let mut depth = 0usize;

    let mut flush = |key: &mut String, value: &mut String, parsing_key: &mut bool| {
        let (k, v) = if *parsing_key {
            // No `=` seen: positional argument held in `key`.
            (None, key.trim().to_string())
        } else {
            (Some(key.trim().to_lowercase()), value.trim().to_string())
        };
        if k.is_some() || !v.is_empty() {
            args.push((k, v));
        }
        key.clear();
        value.clear();
        *parsing_key = true;
    };

    for c in content.chars() {
        let target = if parsing_key { &mut key } else { &mut value };

        if let Some(q) = quote {
            if escaped {
                target.push(match c {
                    'n' => '\n',
                    't' => '\t',
                    other => other,
                });
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                quote = None;
            } else {
                target.push(c);
            }
            continue;
        }

        match c {
            '\'' | '"' => quote = Some(c),
            '(' | '[' | '{' => {
                depth += 1;
                target.push(c);
            }
            ')' | ']' | '}' => {
                depth = depth.saturating_sub(1);
                target.push(c);
            }
            '=' if parsing_key && depth == 0 => parsing_key = false,
            ',' if depth == 0 => flush(&mut key, &mut value, &mut parsing_key),
            _ => target.push(c),
        }
    }
    flush(&mut key, &mut value, &mut parsing_key);

    args
}

/// Parse a point from `(x,y)`, `[x, y]`, `<point>x y</point>` or a 4-number box.
pub fn parse_point(value: &str) -> Result<Point, ParseError> {
    let numbers: Vec<f64> = NUMBER_RE
        .find_iter(value)
        .filter_map(|m| m.as_str().parse().ok())
        .collect();

    match numbers.as_slice() {
        [x, y] => Ok(Point::new(*x, *y)),
        [x1, y1, x2, y2] => Ok(Point::new((x1 + x2) / 2.0, (y1 + y2) / 2.0)),
        _ => Err(ParseError::InvalidCoordinates(value.to_string())),
    }
}

fn parse_direction(value: &str) -> Result<ScrollDirection, ParseError> {
    match value.trim().to_lowercase().as_str() {
        "up" => Ok(ScrollDirection::Up),
        "down" => Ok(ScrollDirection::Down),
        "left" => Ok(ScrollDirection::Left),
        "right" => Ok(ScrollDirection::Right),
        other => Err(ParseError::InvalidDirection(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_response() {
        let text = "Thought: The app icon is on the home screen.\nI should tap it.\nAction: click(start_box='(120,340)')";
        let parsed = parse_response(text);
        assert_eq!(
            parsed.thought,
            "The app icon is on the home screen.\nI should tap it."
        );
        assert_eq!(parsed.action, "click(start_box='(120,340)')");
    }

    #[test]
    fn test_parse_response_action_only_first_line() {
        let text = "Thought: scroll\nAction: scroll(direction='down')\nsome trailing notes";
        assert_eq!(parse_response(text).action, "scroll(direction='down')");
    }

    #[test]
    fn test_parse_response_strips_box_tokens() {
        let text = "Thought: tap\nAction: click(start_box='<|box_start|>(10,20)<|box_end|>')";
        assert_eq!(parse_response(text).action, "click(start_box='(10,20)')");
    }

    #[test]
    fn test_parse_response_bare_action_fallback() {
        let text = "I will tap the search box: click(start_box='(500,80)') and then type.";
        let parsed = parse_response(text);
        assert_eq!(parsed.thought, "");
        assert_eq!(parsed.action, "click(start_box='(500,80)')");
    }

    #[test]
    fn test_parse_response_nothing() {
        assert_eq!(parse_response("no idea"), ParsedResponse::default());
    }

    #[test]
    fn test_add_box_token() {
        let reply = "Thought: drag it\nAction: drag(start_box='(1,2)', end_box='(3, 4)')";
        assert_eq!(
            add_box_token(reply),
            "Thought: drag it\nAction: drag(start_box='<|box_start|>(1,2)<|box_end|>', end_box='<|box_start|>(3, 4)<|box_end|>')"
        );

        let no_box = "Thought: wait\nAction: wait()";
        assert_eq!(add_box_token(no_box), no_box);

        // Already wrapped values are left alone.
        let wrapped = "Action: click(start_box='<|box_start|>(1,2)<|box_end|>')";
        assert_eq!(add_box_token(wrapped), wrapped);
    }

    #[test]
    fn test_parse_click_variants() {
        let expected = Action::Click {
            point: Point::new(100.0, 200.0),
        };
        assert_eq!(parse_action("click(start_box='(100,200)')").unwrap(), expected);
        assert_eq!(parse_action("click(start_box='(100 200)')").unwrap(), expected);
        assert_eq!(parse_action("click(start_box=(100, 200))").unwrap(), expected);
        assert_eq!(parse_action("left_single(point='<point>100 200</point>')").unwrap(), expected);
        assert_eq!(parse_action("click('[100, 200]')").unwrap(), expected);
        assert_eq!(
            parse_action("click(start_box='(50,150,150,250)')").unwrap(),
            expected
        );
        // Missing closing quote and parenthesis, as written in some system prompts.
        assert_eq!(parse_action("click(start_box='(100,200))").unwrap(), expected);
    }

    #[test]
    fn test_parse_drag_and_scroll() {
        assert_eq!(
            parse_action("drag(start_box='(10,20)', end_box='(30,40)')").unwrap(),
            Action::Drag {
                start: Point::new(10.0, 20.0),
                end: Point::new(30.0, 40.0),
            }
        );
        assert_eq!(
            parse_action("scroll(start_box='(500,500)', direction='down')").unwrap(),
            Action::Scroll {
                point: Some(Point::new(500.0, 500.0)),
                direction: ScrollDirection::Down,
            }
        );
        assert_eq!(
            parse_action("scroll(direction=\"UP\")").unwrap(),
            Action::Scroll {
                point: None,
                direction: ScrollDirection::Up,
            }
        );
        assert_eq!(
            parse_action("scroll(direction='sideways')").unwrap_err(),
            ParseError::InvalidDirection("sideways".to_string())
        );
    }

    #[test]
    fn test_parse_type_unescapes() {
        assert_eq!(
            parse_action(r"type(content='it\'s here, ok\n')").unwrap(),
            Action::Type {
                content: "it's here, ok\n".to_string()
            }
        );
    }

    #[test]
    fn test_parse_simple_actions() {
        assert_eq!(parse_action("press_home()").unwrap(), Action::Home);
        assert_eq!(parse_action("press_back()").unwrap(), Action::Back);
        assert_eq!(parse_action("wait()").unwrap(), Action::Wait);
        assert_eq!(parse_action("wait").unwrap(), Action::Wait);
        assert_eq!(
            parse_action("open_app(app_name='抖音极速版')").unwrap(),
            Action::OpenApp {
                app_name: "抖音极速版".to_string()
            }
        );
        assert_eq!(
            parse_action("finished(content='All done')").unwrap(),
            Action::Finished {
                content: Some("All done".to_string())
            }
        );
        assert_eq!(
            parse_action("finished()").unwrap(),
            Action::Finished { content: None }
        );
    }

    #[test]
    fn test_parse_action_name_aliases() {
        let point = Point::new(100.0, 200.0);
        assert_eq!(
            parse_action("left_double(start_box='(100,200)')").unwrap(),
            Action::DoubleClick { point }
        );
        assert_eq!(
            parse_action("right_single(start_box='(100,200)')").unwrap(),
            Action::LongPress { point }
        );
        assert_eq!(
            parse_action("long_press(start_box='(100,200)')").unwrap(),
            Action::LongPress { point }
        );
        assert_eq!(
            parse_action("hover(start_box='(100,200)')").unwrap(),
            Action::Hover { point }
        );
        assert_eq!(
            parse_action("select(start_box='(10,20)', end_box='(30,40)')").unwrap(),
            Action::Drag {
                start: Point::new(10.0, 20.0),
                end: Point::new(30.0, 40.0),
            }
        );
    }

    #[test]
    fn test_parse_parameter_aliases() {
        assert_eq!(
            parse_action("click(start_point='(100,200)')").unwrap(),
            Action::Click {
                point: Point::new(100.0, 200.0)
            }
        );
        assert_eq!(
            parse_action("drag(start_point='(10,20)', end_point='(30,40)')").unwrap(),
            Action::Drag {
                start: Point::new(10.0, 20.0),
                end: Point::new(30.0, 40.0),
            }
        );
        assert_eq!(
            parse_action("type(text='hello')").unwrap(),
            Action::Type {
                content: "hello".to_string()
            }
        );
        assert_eq!(
            parse_action("open_app(app='Settings')").unwrap(),
            Action::OpenApp {
                app_name: "Settings".to_string()
            }
        );
    }

    #[test]
    fn test_parse_bbox_and_backslash() {
        // A box is reduced to its centre.
        assert_eq!(
            parse_action("click(start_box='<bbox>10 20 30 40</bbox>')").unwrap(),
            Action::Click {
                point: Point::new(20.0, 30.0)
            }
        );
        assert_eq!(
            parse_action(r"type(content='C:\\temp')").unwrap(),
            Action::Type {
                content: r"C:\temp".to_string()
            }
        );
    }

    #[test]
    fn test_parse_action_errors() {
        assert!(matches!(parse_action(""), Err(ParseError::NoAction(_))));
        assert!(matches!(
            parse_action("teleport(x=1)"),
            Err(ParseError::UnknownAction(_))
        ));
        assert!(matches!(
            parse_action("click()"),
            Err(ParseError::MissingParameter { .. })
        ));
        assert!(matches!(
            parse_action("click(start_box='(100)')"),
            Err(ParseError::InvalidCoordinates(_))
        ));
        assert!(matches!(
            parse_action("drag(start_box='(1,2)')"),
            Err(ParseError::MissingParameter { .. })
        ));
        assert!(matches!(
            parse_action("not an action at all"),
            Err(ParseError::Malformed(_))
        ));
    }
}
