//! Prompts for the mobile GUI agent.

use serde_json::Value;

use crate::actions::CoordinateSpace;
use crate::config::get_messages;
use crate::model::MessageBuilder;

/// System message sent ahead of the task prompt.
pub static SYSTEM_PROMPT: &str = "You are a mobile UI agent that operates an Android phone from screenshots. \
Always answer with exactly one `Thought:` line followed by one `Action:` line. \
Coordinates must be numbers, never natural-language descriptions.";

/// Task prompt template. `{coordinate_note}`, `{language}` and `{instruction}`
/// are filled in by [`build_mobile_prompt`].
pub static MOBILE_USE_PROMPT: &str = r#"You are a GUI agent. You are given a task and your action history, with screenshots. You need to perform the next action to complete the task.

## Output Format
```
Thought: ...
Action: ...
```

## Action Space
click(start_box='(x1,y1)')
long_press(start_box='(x1,y1)')
type(content='') #If you want to submit your input, use "\n" at the end of `content`.
scroll(start_box='(x1,y1)', direction='down or up or right or left')
open_app(app_name='')
drag(start_box='(x1,y1)', end_box='(x2,y2)')
press_home()
press_back()
wait() #Sleep for a while and take a screenshot to check for any changes.
finished(content='xxx') # Use escape characters \', \", and \n in content part to ensure we can parse the content in normal python string format.

## Coordinates
{coordinate_note}

## Note
- Use {language} in `Thought` part.
- Write a small plan and finally summarize your next action (with its target element) in one sentence in `Thought` part.

## User Instruction
{instruction}
"#;

/// Fill the task prompt for an instruction.
pub fn build_mobile_prompt(instruction: &str, lang: &str, space: CoordinateSpace) -> String {
    MOBILE_USE_PROMPT
        .replace("{coordinate_note}", space.prompt_note())
        .replace("{language}", get_messages(lang).thought_language)
        .replace("{instruction}", instruction.trim())
}

/// Messages that open every request: the system prompt and the task prompt.
pub fn build_prompt_messages(instruction: &str, lang: &str, space: CoordinateSpace) -> Vec<Value> {
    vec![
        MessageBuilder::create_system_message(SYSTEM_PROMPT),
        MessageBuilder::create_user_text_message(&build_mobile_prompt(instruction, lang, space)),
    ]
}
