//! Operant daemon - background session runner
//!
//! Runs training sessions for one subject continuously in the background,
//! managing:
//! - Subject settings and session history
//! - Task execution against the rig (simulated by default)
//! - The between-session training controller
//! - Persistent storage
//! - IPC server for UI clients
//!
//! Storage locations:
//! - Linux: ~/.local/share/operant/
//! - Windows: %APPDATA%\operant\
//! - MacOS: ~/Library/Application Support/operant/

use operant::calibration::CalibrationTable;
use operant::history::{MemoryHistory, SessionHistory, SessionRecord};
use operant::prng::Prng;
use operant::rig::{Event, Port};
use operant::session::SessionLimits;
use operant::settings::TrainingSettings;
use operant::sim::SimulatedRig;
use operant::task::{task_for_name, Task};
use operant::training::update;
use serde::{Deserialize, Serialize};
use std::fs;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::RwLock;
use tokio::time;
use tracing::{error, info, warn};

mod paths;

use operant::executor::TrialExecutor;
use paths::AppPaths;

const SUBJECT: &str = "subject01";

// ═══════════════════════════════════════════════════════════════════════════
// Protocol Messages
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
enum Request {
    GetState,
    Start,
    Stop,
    SetTask { name: String },
    SetTrialPaceMs { ms: u32 },
    InjectPoke { port: String },
    SaveState,
    ResetSubject,
    Shutdown,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
enum Response {
    State(StateSnapshot),
    Success { message: String },
    Error { message: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StateSnapshot {
    running: bool,
    subject: String,
    next_task: String,
    stage: u32,
    reward_amount_ml: f32,
    trial_pace_ms: u32,
    session: Option<SessionSnapshot>,
    sessions_recorded: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SessionSnapshot {
    task: String,
    trials: u32,
    accuracy: f32,
    water_ml: f32,
}

#[derive(Debug, Error)]
enum StoreError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("encode/decode: {0}")]
    Json(#[from] serde_json::Error),
}

// ═══════════════════════════════════════════════════════════════════════════
// Daemon State
// ═══════════════════════════════════════════════════════════════════════════

struct LiveSession {
    task: Box<dyn Task>,
    record: SessionRecord,
    elapsed: Duration,
    limits: SessionLimits,
}

struct DaemonState {
    settings: TrainingSettings,
    history: MemoryHistory,
    calibration: CalibrationTable,
    rig: SimulatedRig,
    rng: Prng,
    running: bool,
    current: Option<LiveSession>,
    trial_pace_ms: u32,
    paths: AppPaths,
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

impl DaemonState {
    fn new(paths: AppPaths) -> Self {
        // Default calibration for the simulated rig; a real rig replaces
        // calibration.json with measured flows.
        let mut calibration = CalibrationTable::new();
        calibration.set_flow(Port::Left, 0.4);
        calibration.set_flow(Port::Right, 0.5);

        Self {
            settings: TrainingSettings::default(),
            history: MemoryHistory::new(SUBJECT),
            calibration,
            rig: SimulatedRig::new(0x0B5E_55ED),
            rng: Prng::new(now_ms() | 1),
            running: false,
            current: None,
            trial_pace_ms: 250,
            paths,
        }
    }

    /// One trial per tick while running. Sessions open lazily and close on
    /// their own budgets; the controller runs at every close.
    fn tick(&mut self) {
        if !self.running {
            return;
        }

        if self.current.is_none() {
            if let Err(e) = self.open_session() {
                error!("cannot open session: {e}");
                self.running = false;
                return;
            }
        }

        let Some(live) = self.current.as_mut() else {
            return;
        };

        let trial = match live.task.build_trial(&mut self.rng) {
            Ok(t) => t,
            Err(e) => {
                error!("trial build failed, aborting session: {e}");
                self.abort_session();
                return;
            }
        };

        let log = match self.rig.run(&trial) {
            Ok(log) => log,
            Err(e) => {
                error!("rig fault, aborting session: {e}");
                self.abort_session();
                return;
            }
        };

        if let Some(last) = log.last() {
            live.elapsed += last.at;
        }
        live.record.push(live.task.after_trial(&log));

        let out_of_trials = live
            .limits
            .max_trials
            .is_some_and(|max| live.record.trial_count() >= max);
        let out_of_time = live
            .limits
            .max_duration
            .is_some_and(|max| live.elapsed >= max);
        if out_of_trials || out_of_time {
            self.close_session();
        }
    }

    fn open_session(&mut self) -> Result<(), String> {
        self.settings.validate().map_err(|e| e.to_string())?;

        let mut task = task_for_name(&self.settings.next_task).map_err(|e| e.to_string())?;
        // Calibration failures surface here, before any trial runs.
        task.start(&self.settings, &self.calibration)
            .map_err(|e| e.to_string())?;

        info!(
            "session opened: task={} stage={} reward_ml={}",
            task.name(),
            self.settings.stage,
            self.settings.reward_amount_ml
        );

        self.current = Some(LiveSession {
            record: SessionRecord::new(task.name(), now_ms()),
            task,
            elapsed: Duration::ZERO,
            limits: SessionLimits::from_settings(&self.settings),
        });
        Ok(())
    }

    /// Normal close: record the session, run the training controller, and
    /// persist the updated state.
    fn close_session(&mut self) {
        let Some(mut live) = self.current.take() else {
            return;
        };
        live.task.close();

        let task_name = live.record.task.clone();
        info!(
            "session closed: task={} trials={} accuracy={:.3} water_ml={:.2}",
            task_name,
            live.record.trial_count(),
            live.record.accuracy(),
            live.record.water_ml()
        );
        self.history.push(live.record);

        let delta = update(&task_name, &self.settings, &self.history);
        if !delta.is_empty() {
            info!(
                "training controller: next_task={:?} stage={:?} reward_ml={:?}",
                delta.next_task, delta.stage, delta.reward_amount_ml
            );
            delta.apply(&mut self.settings);
        }

        if let Err(e) = self.save_state() {
            error!("persist after session failed: {e}");
        }
    }

    /// Abort: keep the partial record for the operator, skip the controller.
    fn abort_session(&mut self) {
        self.running = false;
        let Some(mut live) = self.current.take() else {
            return;
        };
        live.task.close();
        warn!(
            "session aborted after {} trials; controller skipped",
            live.record.trial_count()
        );
        self.history.push(live.record);
        if let Err(e) = self.save_state() {
            error!("persist after abort failed: {e}");
        }
    }

    fn get_snapshot(&self) -> StateSnapshot {
        StateSnapshot {
            running: self.running,
            subject: self.history.subject().to_string(),
            next_task: self.settings.next_task.clone(),
            stage: self.settings.stage,
            reward_amount_ml: self.settings.reward_amount_ml,
            trial_pace_ms: self.trial_pace_ms,
            session: self.current.as_ref().map(|live| SessionSnapshot {
                task: live.record.task.clone(),
                trials: live.record.trial_count(),
                accuracy: live.record.accuracy(),
                water_ml: live.record.water_ml(),
            }),
            sessions_recorded: self.history.len(),
        }
    }

    fn save_state(&self) -> Result<(), StoreError> {
        fs::create_dir_all(self.paths.data_dir())?;

        let settings = serde_json::to_vec_pretty(&self.settings)?;
        fs::write(self.paths.settings_file(), settings)?;

        let history = serde_json::to_vec_pretty(&self.history)?;
        fs::write(self.paths.history_file(), history)?;

        let calibration = serde_json::to_vec_pretty(&self.calibration)?;
        fs::write(self.paths.calibration_file(), calibration)?;

        info!("state saved to {:?}", self.paths.data_dir());
        Ok(())
    }

    fn load_state(&mut self) -> Result<(), StoreError> {
        let settings_path = self.paths.settings_file();
        if settings_path.exists() {
            self.settings = serde_json::from_str(&fs::read_to_string(&settings_path)?)?;
            info!("settings loaded from {:?}", settings_path);
        }

        let history_path = self.paths.history_file();
        if history_path.exists() {
            self.history = serde_json::from_str(&fs::read_to_string(&history_path)?)?;
            info!(
                "history loaded from {:?} ({} sessions)",
                history_path,
                self.history.len()
            );
        }

        let calibration_path = self.paths.calibration_file();
        if calibration_path.exists() {
            self.calibration = serde_json::from_str(&fs::read_to_string(&calibration_path)?)?;
            info!("calibration loaded from {:?}", calibration_path);
        }

        Ok(())
    }

    fn reset_subject(&mut self) {
        self.running = false;
        self.current = None;
        self.settings = TrainingSettings::default();
        self.history = MemoryHistory::new(SUBJECT);
        info!("subject reset to defaults");
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Client Handler
// ═══════════════════════════════════════════════════════════════════════════

async fn handle_client(
    stream: TcpStream,
    state: Arc<RwLock<DaemonState>>,
) -> Result<(), Box<dyn std::error::Error>> {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    while let Some(line) = lines.next_line().await? {
        let request: Request = match serde_json::from_str(&line) {
            Ok(req) => req,
            Err(e) => {
                let resp = Response::Error {
                    message: format!("Invalid request: {}", e),
                };
                writer
                    .write_all(serde_json::to_string(&resp)?.as_bytes())
                    .await?;
                writer.write_all(b"\n").await?;
                continue;
            }
        };

        let response = match request {
            Request::GetState => {
                let s = state.read().await;
                Response::State(s.get_snapshot())
            }
            Request::Start => {
                let mut s = state.write().await;
                s.running = true;
                Response::Success {
                    message: "Started".to_string(),
                }
            }
            Request::Stop => {
                let mut s = state.write().await;
                s.running = false;
                // An operator stop ends the session cleanly at the trial
                // boundary: the in-flight trial already finished in tick().
                s.close_session();
                Response::Success {
                    message: "Stopped".to_string(),
                }
            }
            Request::SetTask { name } => {
                let mut s = state.write().await;
                match task_for_name(&name) {
                    Ok(_) => {
                        s.settings.next_task = name.clone();
                        info!("next task set to {name}");
                        Response::Success {
                            message: format!("Next task set to {name}"),
                        }
                    }
                    Err(e) => Response::Error {
                        message: e.to_string(),
                    },
                }
            }
            Request::SetTrialPaceMs { ms } => {
                let mut s = state.write().await;
                let clamped = ms.clamp(10, 60_000);
                s.trial_pace_ms = clamped;
                info!("trial pace set to {} ms", clamped);
                Response::Success {
                    message: format!("Trial pace set to {} ms", clamped),
                }
            }
            Request::InjectPoke { port } => match Port::parse(&port) {
                Some(p) => {
                    let mut s = state.write().await;
                    s.rig.inject(Event::PortIn(p));
                    Response::Success {
                        message: format!("Injected Port{}In", p.index()),
                    }
                }
                None => Response::Error {
                    message: format!("Unknown port {port:?}"),
                },
            },
            Request::SaveState => {
                let s = state.read().await;
                match s.save_state() {
                    Ok(_) => Response::Success {
                        message: "State saved".to_string(),
                    },
                    Err(e) => Response::Error {
                        message: e.to_string(),
                    },
                }
            }
            Request::ResetSubject => {
                let mut s = state.write().await;
                s.reset_subject();
                match s.save_state() {
                    Ok(_) => Response::Success {
                        message: "Subject reset".to_string(),
                    },
                    Err(e) => Response::Error {
                        message: format!("Reset but save failed: {e}"),
                    },
                }
            }
            Request::Shutdown => {
                let mut s = state.write().await;
                s.running = false;
                s.close_session();
                match s.save_state() {
                    Ok(_) => {
                        info!("Shutdown requested; state saved");
                        tokio::spawn(async {
                            // Give the response a moment to flush before exiting.
                            time::sleep(Duration::from_millis(50)).await;
                            std::process::exit(0);
                        });
                        Response::Success {
                            message: "Shutting down".to_string(),
                        }
                    }
                    Err(e) => Response::Error {
                        message: format!("Save failed, aborting shutdown: {e}"),
                    },
                }
            }
        };

        writer
            .write_all(serde_json::to_string(&response)?.as_bytes())
            .await?;
        writer.write_all(b"\n").await?;
    }

    Ok(())
}

// ═══════════════════════════════════════════════════════════════════════════
// Main
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt::init();

    // Setup application paths
    let paths = AppPaths::new()?;
    info!("Data directory: {:?}", paths.data_dir());

    // Initialize daemon state
    let state = Arc::new(RwLock::new(DaemonState::new(paths)));

    // Save on Ctrl-C so settings/history persist even on abrupt stops.
    {
        let state = Arc::clone(&state);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                let mut s = state.write().await;
                s.running = false;
                s.close_session();
                if let Err(e) = s.save_state() {
                    error!("Ctrl-C save failed: {e}");
                } else {
                    info!("Ctrl-C: state saved");
                }
                std::process::exit(0);
            }
        });
    }

    // Try to load existing subject state
    {
        let mut s = state.write().await;
        if let Err(e) = s.load_state() {
            warn!("Could not load state: {e}");
            info!("Starting with fresh subject");
        }
        if let Err(e) = s.settings.validate() {
            warn!("Loaded settings invalid ({e}); reverting to defaults");
            s.settings = TrainingSettings::default();
        }
    }

    // Start IPC server
    let listener = TcpListener::bind("127.0.0.1:9861").await?;
    info!("Operant daemon listening on 127.0.0.1:9861");

    // Session loop task: one trial per tick
    let state_clone = Arc::clone(&state);
    tokio::spawn(async move {
        loop {
            let pace_ms = {
                let s = state_clone.read().await;
                s.trial_pace_ms.max(1) as u64
            };
            tokio::time::sleep(tokio::time::Duration::from_millis(pace_ms)).await;

            let mut s = state_clone.write().await;
            s.tick();
        }
    });

    // Accept client connections
    loop {
        let (stream, addr) = listener.accept().await?;
        info!("Client connected: {}", addr);
        let state_clone = Arc::clone(&state);

        tokio::spawn(async move {
            if let Err(e) = handle_client(stream, state_clone).await {
                error!("Client handler error: {}", e);
            }
        });
    }
}
