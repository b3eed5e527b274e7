#![forbid(unsafe_code)]

mod adapter;
mod line;

pub use adapter::{IRC_TRANSPORT, IrcAdapter, IrcConfig, TWITCH_MEMBERSHIP_CAP};
pub use line::{IrcLine, decode_names, decode_role_changes};
