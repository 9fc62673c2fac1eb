mod cli;

use std::sync::Arc;

use anyhow::{Context, bail};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};

use twitch_watch::config::{JsonFileStore, PollInterval};
use twitch_watch::logging;
use twitch_watch::monitor::StatusSource;
use twitch_watch::notification::{BrowserOpener, EffectSink, LogOnlySink, TracingObserver};
use twitch_watch::panic_hook;
use twitch_watch::scheduler::SchedulerHandle;
use twitch_watch::services::ServiceContainer;

use crate::cli::{Args, ChannelAction, Commands};

type Container = ServiceContainer<JsonFileStore>;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    let (logging_config, _guard) =
        match logging::init_logging(args.log_filter.as_deref(), args.log_dir.as_deref()) {
            Ok(logging) => logging,
            Err(e) => {
                eprintln!("Error: {e}");
                std::process::exit(1);
            }
        };
    panic_hook::install(args.log_dir.clone());

    if let Err(e) = run(args, logging_config).await {
        error!("Application error: {e:#}");
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

async fn run(args: Args, logging_config: Arc<logging::LoggingConfig>) -> anyhow::Result<()> {
    let path = match args.config {
        Some(path) => path,
        None => JsonFileStore::default_path()?,
    };
    info!(path = %path.display(), "Using config file");

    let container = ServiceContainer::new(Arc::new(JsonFileStore::new(path)))
        .await
        .context("failed to initialize services")?;
    logging_config.start_retention_cleanup(container.cancellation_token());

    // Flags and env apply to this process only; `credentials` persists them.
    let is_credentials_command = matches!(args.command, Commands::Credentials { .. });
    if !is_credentials_command && let Some(client_id) = args.client_id.as_deref() {
        let secret = match args.client_secret.as_deref() {
            Some(secret) => secret.to_string(),
            None => container.credentials.snapshot().client_secret,
        };
        container.override_credentials(client_id, &secret).await;
    }

    let command = async {
        match args.command {
            Commands::Run { no_browser } => {
                run_watch(&container, &logging_config, no_browser).await
            }
            Commands::Check { json } => check_once(&container, json).await,
            Commands::Token { force } => container
                .credentials
                .ensure_token(force)
                .await
                .map(|_| println!("Access token {}", container.credentials.describe()))
                .map_err(Into::into),
            Commands::Channels { action } => manage_channels(&container, action).await,
            Commands::Interval { minutes, seconds } => {
                set_interval(&container, &minutes, &seconds).await
            }
            Commands::Credentials { save_secret } => {
                save_credentials(
                    &container,
                    args.client_id.as_deref(),
                    args.client_secret.as_deref(),
                    save_secret,
                )
                .await
            }
        }
    };

    finish(&container, command).await
}

/// Awaits `command`, then shuts the services down whatever it returned.
async fn finish(
    container: &Container,
    command: impl Future<Output = anyhow::Result<()>>,
) -> anyhow::Result<()> {
    let result = command.await;
    container.shutdown();
    result
}

async fn set_interval(container: &Container, minutes: &str, seconds: &str) -> anyhow::Result<()> {
    let interval = PollInterval::from_parts(minutes, seconds);
    container.config_service.set_poll_interval(interval).await?;
    println!("Poll interval set to {interval}");
    Ok(())
}

async fn run_watch(
    container: &Container,
    logging_config: &logging::LoggingConfig,
    no_browser: bool,
) -> anyhow::Result<()> {
    let config = container.config_service.snapshot().await;
    let effects: Arc<dyn EffectSink> = if no_browser || !config.open_browser {
        Arc::new(LogOnlySink)
    } else {
        Arc::new(BrowserOpener)
    };

    let (handle, join) = container
        .spawn_scheduler(effects, Arc::new(TracingObserver))
        .await;

    container.warm_up_token().await;
    handle.start().await?;
    info!(
        "Type check, stop, start, status, add <login>, remove <login>, interval <m> <s>, log <filter> or quit"
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
            line = lines.next_line(), if stdin_open => match line {
                Ok(Some(line)) => {
                    if !handle_command(container, logging_config, &handle, line.trim()).await? {
                        break;
                    }
                }
                Ok(None) => {
                    info!("stdin closed, press Ctrl-C to exit");
                    stdin_open = false;
                }
                Err(e) => {
                    warn!(error = %e, "Failed to read stdin");
                    stdin_open = false;
                }
            },
        }
    }

    if let Err(e) = handle.shutdown().await {
        warn!(error = %e, "Graceful scheduler shutdown failed, cancelling");
        handle.cancel();
    }
    join.await.context("scheduler task failed")?;
    Ok(())
}

/// Returns false when the user asked to quit.
async fn handle_command(
    container: &Container,
    logging_config: &logging::LoggingConfig,
    handle: &SchedulerHandle,
    command: &str,
) -> anyhow::Result<bool> {
    let (verb, rest) = command
        .split_once(char::is_whitespace)
        .map(|(verb, rest)| (verb, rest.trim()))
        .unwrap_or((command, ""));

    match verb {
        "" => {}
        "check" => handle.check_now().await?,
        "stop" => handle.stop().await?,
        "start" => {
            container.warm_up_token().await;
            handle.start().await?;
        }
        "add" if !rest.is_empty() => match container.add_channel(handle, rest).await {
            Ok(_) => {}
            Err(twitch_watch::Error::Validation(reason)) => warn!("Channel not added: {reason}"),
            Err(e) => return Err(e.into()),
        },
        "remove" if !rest.is_empty() => {
            if !container.remove_channel(handle, rest).await? {
                warn!(login = rest, "Channel is not watched");
            }
        }
        "interval" if !rest.is_empty() => {
            let (minutes, seconds) = rest.split_once(char::is_whitespace).unwrap_or((rest, "0"));
            let interval = PollInterval::from_parts(minutes, seconds.trim());
            container.set_poll_interval(handle, interval).await?;
        }
        "log" if !rest.is_empty() => {
            if let Err(e) = logging_config.set_filter(rest) {
                warn!(error = %e, "Log filter not changed");
            }
        }
        "status" => {
            let state = handle.state().await?;
            info!(
                running = state.running,
                interval = %state.interval,
                channels = state.watched,
                sessions = state.tracked_sessions,
                cycles = state.cycles_completed,
                token = %container.credentials.describe(),
                log_filter = %logging_config.get_filter(),
                "Status"
            );
        }
        "quit" | "exit" => return Ok(false),
        _ => warn!(command, "Unknown command"),
    }
    Ok(true)
}

async fn save_credentials(
    container: &Container,
    client_id: Option<&str>,
    client_secret: Option<&str>,
    save_secret: bool,
) -> anyhow::Result<()> {
    let Some(client_id) = client_id else {
        bail!("--client-id (or TWITCH_CLIENT_ID) is required");
    };
    container
        .update_credentials(client_id, client_secret, save_secret)
        .await?;
    if save_secret {
        println!("Credentials saved");
    } else {
        println!(
            "Client id saved. The secret was not written to disk; provide it through TWITCH_CLIENT_SECRET or rerun with --save-secret"
        );
    }
    Ok(())
}

async fn check_once(container: &Container, json: bool) -> anyhow::Result<()> {
    let watch_set = container.config_service.channels().await;
    if watch_set.is_empty() {
        println!("No channels are watched. Add some with `twitch-watch channels add <login>`.");
        return Ok(());
    }

    let outcome = container.fetcher.fetch_statuses(watch_set.as_slice()).await;
    for issue in &outcome.issues {
        warn!(kind = %issue.kind, "{}", issue.detail);
    }

    if json {
        let statuses: Vec<_> = outcome.statuses.values().collect();
        println!("{}", serde_json::to_string_pretty(&statuses)?);
        return Ok(());
    }

    for status in outcome.statuses.values() {
        if status.is_live {
            println!("{:<25} LIVE     {}", status.login, status.title);
        } else {
            println!("{:<25} offline", status.login);
        }
    }
    Ok(())
}

async fn manage_channels(container: &Container, action: ChannelAction) -> anyhow::Result<()> {
    let service = &container.config_service;
    match action {
        ChannelAction::Add { logins } => {
            for login in logins {
                match service.add_channel(&login).await {
                    Ok(login) => println!("Added {login}"),
                    Err(twitch_watch::Error::Validation(reason)) => println!("Skipped: {reason}"),
                    Err(e) => return Err(e.into()),
                }
            }
        }
        ChannelAction::Remove { logins } => {
            for login in logins {
                if service.remove_channel(&login).await? {
                    println!("Removed {}", login.trim().to_lowercase());
                } else {
                    println!("{} is not watched", login.trim());
                }
            }
        }
        ChannelAction::List => {
            let channels = service.channels().await;
            let interval = service.poll_interval().await;
            println!("{} channel(s), checked every {interval}", channels.len());
            for login in channels.iter() {
                println!("  {login}");
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn failed_command_still_shuts_services_down() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        // A directory where the temp file goes makes every save fail.
        std::fs::create_dir(dir.path().join("config.json.tmp")).unwrap();

        let container = ServiceContainer::new(Arc::new(JsonFileStore::new(path)))
            .await
            .unwrap();

        let result = finish(&container, set_interval(&container, "1", "30")).await;

        assert!(result.is_err());
        assert!(container.cancellation_token().is_cancelled());
        assert_eq!(
            container.config_service.poll_interval().await,
            PollInterval::from_secs(60)
        );
    }
}
