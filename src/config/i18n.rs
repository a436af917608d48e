//! Console messages in Chinese and English.

/// Messages printed by the CLI.
#[derive(Debug, Clone)]
pub struct Messages {
    /// Language name the model is asked to think in.
    pub thought_language: &'static str,
    pub thinking: &'static str,
    pub action: &'static str,
    pub step: &'static str,
    pub task: &'static str,
    pub task_completed: &'static str,
    pub stopped: &'static str,
    pub max_steps_reached: &'static str,
    pub error: &'static str,
    pub instruction_updated: &'static str,
    pub interactive_hint: &'static str,
    pub not_running: &'static str,
    pub goodbye: &'static str,
}

/// Chinese messages
pub static MESSAGES_ZH: Messages = Messages {
    thought_language: "Chinese",
    thinking: "思考过程",
    action: "执行动作",
    step: "步骤",
    task: "任务",
    task_completed: "任务完成",
    stopped: "已停止",
    max_steps_reached: "已达到最大步数",
    error: "错误",
    instruction_updated: "指令已更新",
    interactive_hint: "输入指令后回车开始执行；输入 status 查看状态，stop 停止，quit 退出。",
    not_running: "当前没有运行中的任务",
    goodbye: "再见！",
};

/// English messages
pub static MESSAGES_EN: Messages = Messages {
    thought_language: "English",
    thinking: "Thinking",
    action: "Action",
    step: "Step",
    task: "Task",
    task_completed: "Task Completed",
    stopped: "Stopped",
    max_steps_reached: "Max steps reached",
    error: "Error",
    instruction_updated: "Instruction updated",
    interactive_hint:
        "Type an instruction and press Enter to start; `status` shows progress, `stop` halts, `quit` exits.",
    not_running: "Nothing is running",
    goodbye: "Goodbye!",
};

/// Get messages by language code ("cn" or "en").
pub fn get_messages(lang: &str) -> &'static Messages {
    match lang {
        "en" => &MESSAGES_EN,
        _ => &MESSAGES_ZH,
    }
}
