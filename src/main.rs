use anyhow::{Context, Result};
use clap::Parser;
use memory_keeper::{
    AudioSink, Config, CpalRecorder, DirectorySink, FileRecorder, JsonFileStore, MemorySession,
    Recorder, ReminderList, RodioSink, SessionConfig, UiEvent, WsConnector,
};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "memory-keeper", about = "Voice memo client with reminder extraction")]
struct Args {
    /// Config file (extension optional)
    #[arg(short, long, default_value = "config/memory-keeper")]
    config: String,

    /// Override the server WebSocket URL
    #[arg(long)]
    url: Option<String>,

    /// Save speech fragments to this directory instead of playing them
    #[arg(long)]
    save_audio: Option<PathBuf>,

    /// Use a WAV file as the microphone
    #[arg(long)]
    input_wav: Option<PathBuf>,

    /// Enable verbose (debug) logging
    #[arg(short, long)]
    verbose: bool,
}

const HELP: &str = "\
:rec        start recording
:stop       stop recording and send it
:list       show reminders
:done N     toggle reminder N done
:rm N       delete reminder N
:clear      delete all reminders
:status     show session status
:connect    reconnect after a failure
:help       show this help
:quit       exit
anything else is sent as a text memo";

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(if args.verbose { "debug" } else { "info" })
    });
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let mut cfg = Config::load(&args.config)?;
    if let Some(url) = args.url {
        cfg.socket.url = url;
    }

    info!("{} v{}", cfg.service.name, env!("CARGO_PKG_VERSION"));
    info!("Server: {}", cfg.socket.url);
    info!("Reminders: {}", cfg.storage.reminders_path);

    let sink: Arc<dyn AudioSink> = match &args.save_audio {
        Some(dir) => Arc::new(DirectorySink::new(dir)?),
        None => Arc::new(RodioSink::open()?),
    };
    let recorder: Box<dyn Recorder> = match &args.input_wav {
        Some(path) => Box::new(FileRecorder::new(path)),
        None => Box::new(CpalRecorder::new(
            cfg.audio.input_device.clone(),
            cfg.audio.sample_rate,
        )),
    };
    let reminders = ReminderList::new(Arc::new(JsonFileStore::new(&cfg.storage.reminders_path)));

    let (session, mut events) = MemorySession::start(
        SessionConfig::new(cfg.socket_config()),
        Arc::new(WsConnector),
        sink,
        recorder,
        reminders,
    );

    println!("{}", HELP);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut input_error = None;
    loop {
        tokio::select! {
            event = events.recv() => {
                match event {
                    Some(event) => print_event(event),
                    None => break,
                }
            }
            line = lines.next_line() => {
                let line = match line {
                    Ok(Some(line)) => line,
                    Ok(None) => break,
                    Err(e) => {
                        input_error = Some(e);
                        break;
                    }
                };
                if !handle_line(&session, line.trim()).await {
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    let stats = session.shutdown().await;
    info!(
        "Session {} ended after {:.1}s: {}",
        stats.session_id,
        stats.duration_secs,
        serde_json::to_string(&stats.messages)?
    );

    if let Some(e) = input_error {
        return Err(e).context("Failed to read from stdin");
    }
    Ok(())
}

/// Returns false when the user asked to quit.
async fn handle_line(session: &MemorySession, line: &str) -> bool {
    let (command, arg) = match line.split_once(' ') {
        Some((command, arg)) => (command, arg.trim()),
        None => (line, ""),
    };

    match command {
        "" => {}
        ":quit" | ":q" => return false,
        ":help" => println!("{}", HELP),
        ":rec" => match session.start_recording().await {
            Ok(true) => println!("recording, type :stop to send"),
            Ok(false) => println!("microphone permission denied"),
            Err(e) => println!("recording failed: {:#}", e),
        },
        ":stop" => {
            if let Err(e) = session.stop_recording().await {
                println!("stop recording failed: {:#}", e);
            }
        }
        ":list" => print_reminders(session),
        ":done" | ":rm" => {
            let Ok(index) = arg.parse::<usize>() else {
                println!("usage: {} N", command);
                return true;
            };
            let result = if command == ":done" {
                session.reminders().toggle(index).map(|_| ())
            } else {
                session.reminders().remove(index).map(|_| ())
            };
            match result {
                Ok(()) => print_reminders(session),
                Err(e) => println!("{:#}", e),
            }
        }
        ":clear" => match session.reminders().clear() {
            Ok(()) => println!("reminders cleared"),
            Err(e) => println!("{:#}", e),
        },
        ":status" => {
            let stats = session.stats().await;
            println!("session:   {}", stats.session_id);
            println!("socket:    {}", stats.connection.state);
            if let Some(err) = &stats.connection.last_error {
                println!("error:     {}", err);
            }
            println!("recording: {}", stats.is_recording);
            println!(
                "playback:  playing={:?} pending={:?} played={} failed={}",
                stats.playback.playing,
                stats.playback.pending,
                stats.playback.played,
                stats.playback.failed
            );
        }
        ":connect" => session.reconnect(),
        _ if command.starts_with(':') => println!("unknown command, try :help"),
        _ => {
            if !session.connection().connected() {
                warn!("Not connected; message will be dropped");
            }
            session.send_text(line);
        }
    }
    true
}

fn print_reminders(session: &MemorySession) {
    let reminders = session.reminders().all();
    if reminders.is_empty() {
        println!("no reminders");
        return;
    }
    for (i, r) in reminders.iter().enumerate() {
        println!(
            "{:>3} [{}] {} {} - {}",
            i,
            if r.is_done { "x" } else { " " },
            r.category_icon,
            r.datetime,
            r.description
        );
    }
}

fn print_event(event: UiEvent) {
    match event {
        UiEvent::Response { text, received_at } => {
            println!("[{}] {}", received_at.format("%H:%M:%S"), text)
        }
        UiEvent::ReminderSaved(r) => println!("reminder added: {} ({})", r.description, r.datetime),
        UiEvent::ServerError(message) => println!("server error: {}", message),
        UiEvent::Connection(status) => match &status.last_error {
            Some(err) => println!("connection {}: {}", status.state, err),
            None => println!("connection {}", status.state),
        },
    }
}
