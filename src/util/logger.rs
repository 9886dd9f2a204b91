//! Logger setup for the render worker.

use std::io::Write;

use env_logger::{Builder, Env};
use log::LevelFilter;

pub fn init_logger() {
    let env = Env::default().filter_or("RUST_LOG", "warn,scenecast=info");

    let mut builder = Builder::from_env(env);
    builder
        .filter_module("hyper", LevelFilter::Error)
        .filter_module("hyper_util", LevelFilter::Error)
        .filter_module("reqwest", LevelFilter::Warn)
        .filter_module("rustls", LevelFilter::Warn)
        .format(|buf, record| {
            writeln!(
                buf,
                "[{}] {}: {}",
                record.level(),
                record.target(),
                record.args()
            )
        })
        .target(env_logger::Target::Stderr)
        .init();
}
