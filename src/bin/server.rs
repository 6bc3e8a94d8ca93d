//! Live-chat relay server binary.
//! Run with: cargo run --bin axeschat-server

use std::process::ExitCode;

use axes_livechat::start_livechat;

fn main() -> ExitCode {
    start_livechat::run()
}
