//! Parsing model replies into actions and executing them.

mod coordinates;
mod handler;
mod parser;

pub use coordinates::{
    smart_resize, CoordinateSpace, Point, ScreenSize, IMAGE_FACTOR, MAX_PIXELS, MIN_PIXELS,
    RELATIVE_COORDINATE_MAX,
};
pub use handler::{ActionHandler, ActionResult, DeviceAction, DEFAULT_WAIT_SECS, SCROLL_FRACTION};
pub use parser::{
    add_box_token, parse_action, parse_point, parse_response, strip_box_tokens, Action,
    ParseError, ParsedResponse, ScrollDirection,
};
