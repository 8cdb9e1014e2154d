mod command;
mod scene;
mod transport;

use std::path::{Path, PathBuf};

use clap::Parser;
use foundation::{TimeRange, TimeSelection, Vec3, Viewpoint};
use futures_util::StreamExt;
use streaming::{Client, Session, StreamingConfig};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::command::{Command, parse_command};
use crate::scene::LogScene;
use crate::transport::WsTransport;

/// Camera position the viewer starts from (cartesian meters, above Europe).
const DEFAULT_VIEW: Vec3 = Vec3::new(
    695_030.219_396_238_8,
    4_992_938.408_158_433,
    4_750_739.144_573_923,
);

#[derive(Parser, Debug)]
#[command(author, version, about = "Streams point cells for a viewpoint from a cells server")]
struct Args {
    /// WebSocket URL of the cells server
    #[arg(long, env = "CELLS_SERVER", default_value = "ws://127.0.0.1:11027")]
    url: String,

    /// JSON file with streaming settings (missing fields use defaults)
    #[arg(long)]
    config: Option<PathBuf>,

    /// LOD bias override (useful range 9.3..9.7)
    #[arg(long)]
    detail_bias: Option<f64>,
}

async fn load_config(path: Option<&Path>) -> Result<StreamingConfig, Box<dyn std::error::Error>> {
    let Some(path) = path else {
        return Ok(StreamingConfig::default());
    };
    let raw = tokio::fs::read_to_string(path).await?;
    Ok(StreamingConfig::from_json_str(&raw)?)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let mut config = load_config(args.config.as_deref()).await?;
    if let Some(bias) = args.detail_bias {
        config.detail_bias = bias;
    }

    let (socket, _response) = connect_async(args.url.as_str()).await?;
    info!(url = %args.url, "connected");
    let (ws_tx, mut ws_rx) = socket.split();
    let (transport, writer) = WsTransport::spawn(ws_tx);

    let mut client = Client::new(config);
    client.connect(transport)?;

    let mut scene = LogScene::default();
    let mut time = TimeSelection::default();
    let mut view = Viewpoint::from_cartesian(DEFAULT_VIEW);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    let mut ready = false;

    loop {
        let Some(session) = client.session_mut() else {
            break;
        };

        tokio::select! {
            msg = ws_rx.next() => {
                let msg = match msg {
                    Some(Ok(m)) => m,
                    Some(Err(e)) => {
                        warn!("receive error: {e}");
                        session.on_close();
                        break;
                    }
                    None => {
                        session.on_close();
                        break;
                    }
                };
                match msg {
                    Message::Binary(data) => {
                        if let Err(e) = session.on_message(&data, &mut scene) {
                            error!("stream failed: {e}");
                            break;
                        }
                        if !ready && session.server_params().is_some() {
                            ready = true;
                            refresh(session, &view, &time);
                        }
                    }
                    Message::Close(_) => {
                        info!("server closed the connection");
                        session.on_close();
                        break;
                    }
                    _ => {}
                }
            }
            line = lines.next_line(), if stdin_open => {
                match stdin_step(line?.as_deref()) {
                    Ok(Step::Idle) => {}
                    Ok(Step::StdinClosed) => {
                        debug!("stdin closed; streaming the current view");
                        stdin_open = false;
                    }
                    Ok(Step::Run(Command::Quit)) => break,
                    Ok(Step::Run(Command::Stats)) => log_stats(session, &scene),
                    Ok(Step::Run(Command::View(v))) => {
                        view = v;
                        refresh(session, &view, &time);
                    }
                    Ok(Step::Run(Command::Mode)) => {
                        time.mode = time.mode.next();
                        info!(mode = time.mode.label(), "time mode");
                        refresh(session, &view, &time);
                    }
                    Ok(Step::Run(Command::Time { t0, t1 })) => {
                        time.range = TimeRange::new(t0, t1);
                        refresh(session, &view, &time);
                    }
                    Err(e) => warn!("{e}"),
                }
            }
        }
    }

    if let Some(session) = client.disconnect() {
        log_stats(&session, &scene);
    }
    let _ = writer.await;
    Ok(())
}

/// Outcome of one read from stdin.
#[derive(Debug, PartialEq)]
enum Step {
    Idle,
    /// End of input: stop reading, keep serving the socket.
    StdinClosed,
    Run(Command),
}

fn stdin_step(line: Option<&str>) -> Result<Step, String> {
    let Some(line) = line else {
        return Ok(Step::StdinClosed);
    };
    Ok(parse_command(line)?.map_or(Step::Idle, Step::Run))
}

fn refresh(session: &mut Session<WsTransport>, view: &Viewpoint, time: &TimeSelection) {
    match session.refresh(view, time) {
        Ok(sent) => info!(
            sent,
            outstanding = session.cache().outstanding_len(),
            "traversal pass"
        ),
        Err(e) => warn!("traversal pass failed: {e}"),
    }
}

fn log_stats(session: &Session<WsTransport>, scene: &LogScene) {
    let snapshot = session.metrics().snapshot();
    for (metric, value) in snapshot.counters {
        info!(metric = metric.name(), value, "counter");
    }
    for (metric, value) in snapshot.gauges {
        info!(metric = metric.name(), value, "gauge");
    }
    for (metric, h) in snapshot.histograms {
        info!(
            metric = metric.name(),
            count = h.count,
            min = h.min,
            max = h.max,
            mean = h.mean().unwrap_or(0.0),
            "histogram"
        );
    }
    info!(
        cells = scene.cell_count(),
        points = scene.point_count(),
        outstanding = session.cache().outstanding_len(),
        "scene"
    );
}
