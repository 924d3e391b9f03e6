// Copyright (c) 2024 MQTT broker contributors. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use std::path::PathBuf;

use clap::Parser;
use mqtt_broker::config::Config;
use mqtt_broker::plugin::{AllowAllAcl, AllowAllAuth, InMemoryAuth, PluginHost};
use mqtt_broker::{dispatcher, server};
use tokio::sync::{mpsc, watch};

/// MQTT 3.1.1 broker.
#[derive(Debug, Parser)]
#[command(name = "mqtt-broker", version, about)]
struct Cli {
    /// Path to a TOML configuration file.
    #[arg(short, long, default_value = "mqtt-broker.toml")]
    config: PathBuf,
}

const DISPATCHER_CHANNEL_CAPACITY: usize = 1024;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let content = std::fs::read_to_string(&cli.config).unwrap_or_else(|err| {
        eprintln!("failed to read {}: {err}", cli.config.display());
        std::process::exit(1);
    });
    let config = Config::from_toml(&content).unwrap_or_else(|err| {
        eprintln!("invalid configuration: {err}");
        std::process::exit(1);
    });

    env_logger::Builder::new()
        .filter_level(match config.log().level() {
            mqtt_broker::config::LogLevel::Error => log::LevelFilter::Error,
            mqtt_broker::config::LogLevel::Warn => log::LevelFilter::Warn,
            mqtt_broker::config::LogLevel::Info => log::LevelFilter::Info,
            mqtt_broker::config::LogLevel::Debug => log::LevelFilter::Debug,
            mqtt_broker::config::LogLevel::Trace => log::LevelFilter::Trace,
        })
        .init();

    // No packaged auth plugin backend is in scope here: an `auth.plugins`
    // entry is only meaningful once a collaborator registers that name, so
    // this binary only ever wires up the reference backends. `allow_anonymous`
    // still governs which one: with anonymous access off and no plugin
    // providing credentials, every CONNECT is refused rather than let through.
    let auth: Box<dyn mqtt_broker::plugin::AuthBackend> = if config.security().allow_anonymous() {
        Box::new(AllowAllAuth)
    } else {
        Box::new(InMemoryAuth::new())
    };
    let acls: Vec<Box<dyn mqtt_broker::plugin::AclBackend>> = if config.security().topic_check_enabled() {
        vec![Box::new(AllowAllAcl)]
    } else {
        Vec::new()
    };
    let plugins = PluginHost::new(auth, acls, config.security().plugin_timeout_ms());

    let (dispatcher_tx, dispatcher_rx) = mpsc::channel(DISPATCHER_CHANNEL_CAPACITY);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let dispatcher_config = config.clone();
    let dispatcher_handle = tokio::spawn(async move {
        dispatcher::Dispatcher::new(dispatcher_config, plugins, dispatcher_rx)
            .run()
            .await;
    });

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::info!("shutdown requested");
            let _ = shutdown_tx.send(true);
        }
    });

    if let Err(err) = server::run(config, dispatcher_tx, shutdown_rx).await {
        eprintln!("server error: {err}");
        std::process::exit(1);
    }

    let _ = dispatcher_handle.await;
}
