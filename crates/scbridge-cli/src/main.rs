//! scbridge CLI — standalone bridge server.
//!
//! ```text
//! scbridge serve [--port 2004] [--script supercollider/scbridge.scd]
//! scbridge play pad1 simpleSine 220 330 [--param lpFreq=3000]
//! scbridge update pad1 lpFreq=1200 [--server http://localhost:2004]
//! scbridge kill pad1 / voices / start-engine / stop-engine / engine-status
//! scbridge set-port 57120
//! ```

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use scbridge_lib::bus::{run_listener, UdpBus};
use scbridge_lib::registry::VoiceRegistry;
use scbridge_lib::scbridge_core::types::EngineConfig;
use scbridge_lib::server::AppState;
use scbridge_lib::supervisor::EngineSupervisor;

const DEFAULT_SERVER: &str = "http://localhost:2004";

/// scbridge — supervise SuperCollider and track its voices
#[derive(Parser)]
#[command(name = "scbridge", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the bridge server
    Serve {
        /// HTTP listen port
        #[arg(long, default_value = "2004")]
        port: u16,
        /// HTTP listen host
        #[arg(long, default_value = "127.0.0.1")]
        host: String,
        /// SuperCollider script handed to sclang
        #[arg(long, default_value = "supercollider/scbridge.scd")]
        script: PathBuf,
        /// Explicit sclang binary (default: per-platform install path)
        #[arg(long)]
        sclang: Option<PathBuf>,
        /// UDP port the engine listens on for requests
        #[arg(long, default_value = "57120")]
        feedback_port: u16,
        /// UDP port to listen on for engine confirmations
        #[arg(long, default_value = "57121")]
        listen_port: u16,
        /// Launch sclang immediately instead of waiting for /engine/start
        #[arg(long)]
        start_engine: bool,
    },
    /// Play one voice per frequency under a logical name
    Play {
        /// Logical voice name (e.g. "pad1")
        name: String,
        /// SynthDef name on the engine side (e.g. "simpleSine")
        synth_type: String,
        /// Frequencies, one voice each
        #[arg(required = true)]
        freqs: Vec<f64>,
        /// Extra synth params as key=value
        #[arg(long = "param")]
        params: Vec<String>,
        #[arg(long, default_value = DEFAULT_SERVER)]
        server: String,
    },
    /// Update all voices under a logical name
    Update {
        name: String,
        /// Params as key=value
        #[arg(required = true)]
        params: Vec<String>,
        #[arg(long, default_value = DEFAULT_SERVER)]
        server: String,
    },
    /// Kill all voices under a logical name
    Kill {
        name: String,
        #[arg(long, default_value = DEFAULT_SERVER)]
        server: String,
    },
    /// Print the voice table
    Voices {
        #[arg(long, default_value = DEFAULT_SERVER)]
        server: String,
    },
    /// Launch (or relaunch) sclang on the running bridge
    StartEngine {
        #[arg(long, default_value = DEFAULT_SERVER)]
        server: String,
    },
    /// Stop sclang and scsynth on the running bridge
    StopEngine {
        #[arg(long, default_value = DEFAULT_SERVER)]
        server: String,
    },
    /// Print engine process status
    EngineStatus {
        #[arg(long, default_value = DEFAULT_SERVER)]
        server: String,
    },
    /// Point outbound requests at a different engine-side port
    SetPort {
        port: u16,
        #[arg(long, default_value = DEFAULT_SERVER)]
        server: String,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "scbridge_lib=debug,sclang=info".into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Serve {
            port,
            host,
            script,
            sclang,
            feedback_port,
            listen_port,
            start_engine,
        } => {
            let config = EngineConfig {
                sclang_path: sclang,
                script_path: script,
                feedback_port,
                listen_port,
                ..Default::default()
            };

            let target = format!("127.0.0.1:{feedback_port}")
                .parse()
                .expect("bad feedback address");
            let bus = std::sync::Arc::new(UdpBus::new(target).expect("failed to bind bus socket"));
            let registry = VoiceRegistry::new(bus.clone());
            let supervisor = EngineSupervisor::new(config, bus);

            let feedback = tokio::net::UdpSocket::bind(format!("0.0.0.0:{listen_port}"))
                .await
                .expect("failed to bind feedback socket");
            tokio::spawn(run_listener(feedback, registry.clone()));

            if start_engine {
                supervisor.start().await.expect("failed to start sclang");
            }

            let app = scbridge_lib::server::router(AppState {
                registry,
                supervisor,
            });

            let addr = format!("{host}:{port}");
            eprintln!("scbridge listening on {addr}");

            let listener = tokio::net::TcpListener::bind(&addr)
                .await
                .expect("failed to bind");

            axum::serve(listener, app).await.expect("server error");
        }

        Command::Play {
            name,
            synth_type,
            freqs,
            params,
            server,
        } => {
            let body = serde_json::json!({
                "name": name,
                "synthType": synth_type,
                "freqs": freqs,
                "params": parse_params(&params),
            });
            post_json(&server, "play", &body).await;
        }

        Command::Update {
            name,
            params,
            server,
        } => {
            let body = serde_json::json!({
                "name": name,
                "params": parse_params(&params),
            });
            post_json(&server, "update", &body).await;
        }

        Command::Kill { name, server } => {
            post_json(&server, "kill", &serde_json::json!({ "name": name })).await;
        }

        Command::Voices { server } => get_simple(&server, "voices").await,
        Command::StartEngine { server } => post_simple(&server, "engine/start").await,
        Command::StopEngine { server } => post_simple(&server, "engine/stop").await,
        Command::EngineStatus { server } => get_simple(&server, "engine/status").await,

        Command::SetPort { port, server } => {
            post_json(&server, "engine/port", &serde_json::json!({ "port": port })).await;
        }
    }
}

/// Parse `key=value` pairs, keeping numeric values numeric.
fn parse_params(pairs: &[String]) -> serde_json::Map<String, serde_json::Value> {
    let mut map = serde_json::Map::new();
    for pair in pairs {
        let Some((key, value)) = pair.split_once('=') else {
            eprintln!("ignoring malformed param {pair:?} (expected key=value)");
            continue;
        };
        let value = if let Ok(i) = value.parse::<i64>() {
            serde_json::Value::from(i)
        } else if let Ok(f) = value.parse::<f64>() {
            serde_json::Value::from(f)
        } else {
            serde_json::Value::from(value)
        };
        map.insert(key.to_string(), value);
    }
    map
}

async fn post_json(server: &str, endpoint: &str, body: &serde_json::Value) {
    let resp = reqwest::Client::new()
        .post(format!("{server}/{endpoint}"))
        .json(body)
        .send()
        .await
        .expect("request failed");
    println!("{}", resp.text().await.unwrap_or_default());
}

async fn post_simple(server: &str, endpoint: &str) {
    let resp = reqwest::Client::new()
        .post(format!("{server}/{endpoint}"))
        .send()
        .await
        .expect("request failed");
    println!("{}", resp.text().await.unwrap_or_default());
}

async fn get_simple(server: &str, endpoint: &str) {
    let resp = reqwest::Client::new()
        .get(format!("{server}/{endpoint}"))
        .send()
        .await
        .expect("request failed");
    println!("{}", resp.text().await.unwrap_or_default());
}
