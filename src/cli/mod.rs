pub mod commands;
pub mod util;

pub use util::{CommandContext, Output, parse_feature, print_json};
