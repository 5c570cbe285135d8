use anyhow::{bail, Context};
use avatar_rtc::testing::{MemoryAudioFactory, MemoryChannel, MemoryVideoSurface};
use avatar_rtc::webrtc::{extract_answer_sdp, normalize_ice_servers, IceServerInput};
use avatar_rtc::{AvatarRtcConfig, AvatarSession, MessageDisposition, UserActivation};
use std::env;
use std::fs;
use std::sync::Arc;
use std::time::Duration;

fn main() -> anyhow::Result<()> {
    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        eprintln!("Usage: avatar-rtc-cli <normalize-ice|parse-answer|offer> [args]");
        std::process::exit(1);
    }

    let command = &args[1];
    match command.as_str() {
        "normalize-ice" => cmd_normalize_ice(&args),
        "parse-answer" => cmd_parse_answer(&args),
        "offer" => cmd_offer(&args),
        _ => {
            eprintln!("Unknown command: {}", command);
            std::process::exit(1);
        }
    }
}

fn flag_value(args: &[String], i: &mut usize, flag: &str) -> anyhow::Result<String> {
    *i += 1;
    args.get(*i)
        .cloned()
        .with_context(|| format!("{} needs a value", flag))
}

fn cmd_normalize_ice(args: &[String]) -> anyhow::Result<()> {
    // normalize-ice <url>... [--username <u>] [--password <p>] [--json]
    let mut urls = Vec::new();
    let mut username = None;
    let mut password = None;
    let mut json = false;

    let mut i = 2;
    while i < args.len() {
        match args[i].as_str() {
            "--username" => username = Some(flag_value(args, &mut i, "--username")?),
            "--password" => password = Some(flag_value(args, &mut i, "--password")?),
            "--json" => json = true,
            url => urls.push(url.to_string()),
        }
        i += 1;
    }
    if urls.is_empty() {
        bail!("Usage: avatar-rtc-cli normalize-ice <url>... [--username u --password p] [--json]");
    }

    let input = if urls.len() == 1 {
        IceServerInput::Url(urls.remove(0))
    } else {
        IceServerInput::Urls(urls)
    };
    let servers = normalize_ice_servers(input, username.as_deref(), password.as_deref());

    if json {
        println!("{}", serde_json::to_string_pretty(&servers)?);
    } else {
        for server in servers {
            let auth = match (&server.username, &server.credential) {
                (Some(user), Some(_)) => format!(" (user {})", user),
                _ => String::new(),
            };
            println!("{}{}", server.urls.join(", "), auth);
        }
    }
    Ok(())
}

fn cmd_parse_answer(args: &[String]) -> anyhow::Result<()> {
    let Some(path) = args.get(2) else {
        bail!("Usage: avatar-rtc-cli parse-answer <message.json>");
    };
    let contents = fs::read_to_string(path).with_context(|| format!("reading {}", path))?;
    let message: serde_json::Value = serde_json::from_str(&contents)?;
    let (shape, sdp) = extract_answer_sdp(&message)?;
    eprintln!("answer shape: {:?}", shape);
    println!("{}", sdp);
    Ok(())
}

fn cmd_offer(args: &[String]) -> anyhow::Result<()> {
    // offer <session-updated.json> [--config <file>] [--timeout <ms>]
    let mut update_path = None;
    let mut config_path = AvatarRtcConfig::default_path();
    let mut timeout_ms = 10_000u64;

    let mut i = 2;
    while i < args.len() {
        match args[i].as_str() {
            "--config" => config_path = flag_value(args, &mut i, "--config")?.into(),
            "--timeout" => timeout_ms = flag_value(args, &mut i, "--timeout")?.parse()?,
            path => update_path = Some(path.to_string()),
        }
        i += 1;
    }
    let Some(update_path) = update_path else {
        bail!("Usage: avatar-rtc-cli offer <session-updated.json> [--config file] [--timeout ms]");
    };

    let config = AvatarRtcConfig::load_with_env(&config_path)?;
    config.validate()?;
    avatar_rtc::init_logging_with(&config.logging.filter);

    let contents =
        fs::read_to_string(&update_path).with_context(|| format!("reading {}", update_path))?;

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async {
        let channel = Arc::new(MemoryChannel::new());
        let session = AvatarSession::new(
            &config,
            channel.clone(),
            Arc::new(MemoryVideoSurface::new()),
            Arc::new(MemoryAudioFactory::new()),
            UserActivation::new(),
        );

        match session.handle_text(&contents).await? {
            MessageDisposition::SetupStarted => {}
            other => bail!("session update did not start negotiation: {:?}", other),
        }

        let message = channel
            .next_message(Duration::from_millis(timeout_ms))
            .await
            .context("ICE gathering did not complete in time")?;
        println!("{}", serde_json::to_string_pretty(&message)?);

        session.close().await;
        Ok::<(), anyhow::Error>(())
    })
}
