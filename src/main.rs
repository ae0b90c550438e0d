use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;
use tracing_subscriber::EnvFilter;

use tunegem::audio::convert::downmix_to_mono;
use tunegem::audio::file::expand_path;
use tunegem::audio::{probe_file, SpectrumAnalyzer};
use tunegem::session::{CONNECTIVITY_MESSAGE, NO_MATCH_MESSAGE};
use tunegem::{
    create_router, display, AppState, CaptureBackendFactory, CaptureConfig, CaptureService,
    CaptureSource, Config, GeminiClient, Recognizer, SessionController, SessionError,
    SessionHandle, SessionStatus,
};

#[derive(Parser)]
#[command(name = "tunegem", version, about = "Identify the song playing around you")]
struct Cli {
    /// Config file (extension optional)
    #[arg(long, global = true, default_value = "config/tunegem")]
    config: String,

    /// API key for the recognition service
    #[arg(long, global = true, env = "GEMINI_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Record from the microphone and identify what is playing
    Listen {
        /// Recording window in seconds
        #[arg(long)]
        duration: Option<u64>,

        /// Replay a WAV file instead of using the microphone
        #[arg(long)]
        input: Option<String>,
    },

    /// Identify an existing audio file
    Identify {
        /// WAV, MP3, FLAC, OGG or M4A file
        file: String,
    },

    /// Serve the session control API over HTTP
    Serve {
        #[arg(long)]
        bind: Option<String>,

        #[arg(long)]
        port: Option<u16>,

        /// Replay a WAV file instead of using the microphone
        #[arg(long)]
        input: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = Config::load(&cli.config)?;

    info!("tunegem v{}", env!("CARGO_PKG_VERSION"));

    let api_key = cli
        .api_key
        .clone()
        .or_else(|| cfg.recognition.api_key.clone())
        .unwrap_or_default();
    let recognizer = GeminiClient::new(&cfg.recognition, api_key)
        .context("Failed to set up the recognition client")?;

    match cli.command {
        Command::Listen { duration, input } => {
            let window = duration
                .map(Duration::from_secs)
                .unwrap_or_else(|| cfg.capture.window());
            let capture = build_capture(&cfg, input.as_deref())?;
            let handle = SessionController::spawn(capture, Arc::new(recognizer), window);
            listen(handle, window).await
        }
        Command::Identify { file } => identify(&recognizer, &file).await,
        Command::Serve { bind, port, input } => {
            let capture = build_capture(&cfg, input.as_deref())?;
            let handle =
                SessionController::spawn(capture, Arc::new(recognizer), cfg.capture.window());
            let bind = bind.unwrap_or_else(|| cfg.http.bind.clone());
            let port = port.unwrap_or(cfg.http.port);
            serve(handle, &bind, port).await
        }
    }
}

fn build_capture(cfg: &Config, input: Option<&str>) -> Result<CaptureService> {
    let source = match input {
        Some(path) => CaptureSource::File {
            path: expand_path(path),
            realtime: true,
        },
        None => CaptureSource::Microphone,
    };

    let backend = CaptureBackendFactory::create(source, CaptureConfig::from(&cfg.capture))
        .context("Failed to create capture backend")?;
    Ok(CaptureService::new(backend))
}

async fn listen(handle: SessionHandle, window: Duration) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        match handle.start().await {
            Ok(_) => {}
            // The session is already in Error with the capture's message
            Err(SessionError::Capture(_)) => {}
            Err(e) => return Err(e.into()),
        }

        if handle.status() == SessionStatus::Recording {
            eprintln!(
                "Listening... hold your device close to the music ({}s, Enter to stop early)",
                window.as_secs()
            );
            let visualizer = tokio::spawn(visualize(handle.clone()));

            tokio::select! {
                line = lines.next_line() => {
                    // Closed stdin just lets the window run out
                    if let Ok(Some(_)) = line {
                        handle.stop().await?;
                    }
                }
                _ = handle.wait_to_leave(SessionStatus::Recording) => {}
            }

            let _ = visualizer.await;
            if handle.status() == SessionStatus::Analyzing {
                eprintln!("Analyzing... identifying the track and artist details");
            }
        }

        let snapshot = handle.wait_for_terminal().await?;
        println!();
        match (&snapshot.status, &snapshot.result) {
            (SessionStatus::Success, Some(song)) => print!("{}", display::render_song(song)),
            _ => print!("{}", display::render_error(snapshot.error_message.as_deref())),
        }

        eprint!("\nIdentify another song? [Y/n] ");
        let answer = lines.next_line().await?.unwrap_or_default();
        if answer.trim().eq_ignore_ascii_case("n") {
            break;
        }
        handle.reset().await?;
    }

    Ok(())
}

/// Draw spectrum bars on stderr while the session is recording
async fn visualize(handle: SessionHandle) {
    let mut live = handle.live_stream();
    let mut analyzer = SpectrumAnalyzer::new();
    let mut ticker = tokio::time::interval(Duration::from_millis(50));

    while handle.status() == SessionStatus::Recording {
        ticker.tick().await;
        while let Some(frame) = live.try_next() {
            if frame.channels > 1 {
                analyzer.push(&downmix_to_mono(&frame.samples, frame.channels));
            } else {
                analyzer.push(&frame.samples);
            }
        }
        eprint!("\r  {}", display::render_bars(&analyzer.byte_frequency_data(), 48));
    }
    eprintln!();
}

async fn identify(recognizer: &GeminiClient, file: &str) -> Result<()> {
    let path = expand_path(file);
    let clip = probe_file(&path)?;

    match recognizer.identify(&clip).await {
        Ok(Some(song)) => print!("{}", display::render_song(&song)),
        Ok(None) => print!("{}", display::render_error(Some(NO_MATCH_MESSAGE))),
        Err(e) => {
            print!("{}", display::render_error(Some(CONNECTIVITY_MESSAGE)));
            return Err(e).context("Recognition request failed");
        }
    }

    Ok(())
}

async fn serve(handle: SessionHandle, bind: &str, port: u16) -> Result<()> {
    let app = create_router(AppState::new(handle));
    let addr = format!("{}:{}", bind, port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    info!("HTTP API listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutting down");
        })
        .await
        .context("HTTP server failed")?;

    Ok(())
}
