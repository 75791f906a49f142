use std::fs;
use std::path::Path;
use std::time::{Duration, Instant};

use anyhow::{bail, Context};
use chrono::Utc;
use tracker_core::{update, AppState, Effect, JobId, MediaKind, Msg};
use tracker_engine::{
    EngineHandle, GenerationKind, GenerationRequest, SourceImage, StateFile, TrackerConfig,
};
use tracker_logging::{tracker_debug, tracker_info};

use crate::cli::{Cli, Command, KindArg, SubmitArgs};
use crate::effects::{map_event, EffectRunner, Inbound};
use crate::persistence::{load_snapshot, save_snapshot};
use crate::render;

const TICK: Duration = Duration::from_millis(250);

pub fn run(cli: Cli, config: TrackerConfig) -> anyhow::Result<()> {
    let store = StateFile::new(cli.state_file);
    match cli.command {
        Command::List => {
            let session = Session::open(store, None);
            print_lines(render::summary(&session.state.view()));
            Ok(())
        }
        Command::Clear { job_id } => {
            let mut session = Session::open(store, None);
            let job_id = JobId::new(job_id);
            if session.state.job(&job_id).is_none() {
                bail!("no remembered job {job_id}");
            }
            session.dispatch(Msg::ClearJob {
                job_id: job_id.clone(),
            });
            println!("cleared {job_id}");
            Ok(())
        }
        Command::Submit(args) => submit(args, config, store),
        Command::Track {
            job_id,
            kind,
            project,
        } => {
            let mut session = Session::open(store, None);
            let job_id = JobId::new(job_id);
            if session
                .state
                .job(&job_id)
                .is_some_and(|job| job.status.is_terminal())
            {
                print_job(&session.state, &job_id);
                return Ok(());
            }
            session.attach(start_engine(&config)?);
            session.dispatch(Msg::Submitted {
                job_id: job_id.clone(),
                project_id: project.then(|| job_id.to_string()),
                request_id: None,
                kind: media_kind(kind),
                prompt: None,
                at_ms: now_ms(),
            });
            session.follow(&job_id, wait_budget(&config))?;
            session.finish();
            Ok(())
        }
        Command::Check { job_id } => {
            let mut session = Session::open(store, None);
            let job_id = JobId::new(job_id);
            let Some(job) = session.state.job(&job_id) else {
                bail!("no remembered job {job_id}");
            };
            if job.status.is_terminal() {
                print_job(&session.state, &job_id);
                return Ok(());
            }
            session.attach(start_engine(&config)?);
            session.dispatch(Msg::ForceCheckRequested {
                job_id: job_id.clone(),
            });
            session.follow(&job_id, config.request_timeout + Duration::from_secs(2))?;
            session.finish();
            Ok(())
        }
        Command::Recover => {
            let mut session = Session::open(store, Some(start_engine(&config)?));
            if !session.state.has_active_jobs() {
                println!("nothing to recover");
                session.finish();
                return Ok(());
            }
            session.pump(|state| !state.has_active_jobs(), wait_budget(&config))?;
            print_lines(render::summary(&session.state.view()));
            session.finish();
            Ok(())
        }
    }
}

fn submit(args: SubmitArgs, config: TrackerConfig, store: StateFile) -> anyhow::Result<()> {
    let request = build_request(&args)?;
    let mut session = Session::open(store, None);
    session.attach(start_engine(&config)?);

    session.runner()?.engine().submit(request);
    let job_id = session.await_submission(config.request_timeout + Duration::from_secs(5))?;
    println!("submitted {job_id}");

    if args.no_wait {
        println!("run `tracker recover` to follow it");
    } else {
        session.follow(&job_id, wait_budget(&config))?;
    }
    session.finish();
    Ok(())
}

fn build_request(args: &SubmitArgs) -> anyhow::Result<GenerationRequest> {
    let kind = match args.kind {
        KindArg::Image => GenerationKind::Image,
        KindArg::Video => GenerationKind::Video,
    };
    let mut request = GenerationRequest::text(kind, args.prompt.clone());
    request.model = args.model.clone();
    request.style = args.style.clone();
    request.resolution = args.resolution.clone();
    if let Some(path) = &args.image {
        request.source_image = Some(read_image(path)?);
    }
    Ok(request)
}

fn read_image(path: &Path) -> anyhow::Result<SourceImage> {
    let mime = match path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
        .as_deref()
    {
        Some("png") => "image/png",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("webp") => "image/webp",
        _ => bail!("unsupported source image type: {}", path.display()),
    };
    let bytes =
        fs::read(path).with_context(|| format!("reading source image {}", path.display()))?;
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "source".to_string());
    Ok(SourceImage {
        file_name,
        mime: mime.to_string(),
        bytes,
    })
}

fn start_engine(config: &TrackerConfig) -> anyhow::Result<EffectRunner> {
    let engine = EngineHandle::new(config.clone()).context("starting tracker engine")?;
    Ok(EffectRunner::new(engine))
}

/// Long enough for recovery checks plus a full polling run.
fn wait_budget(config: &TrackerConfig) -> Duration {
    config.recovery.total_budget() + config.polling.total_budget() + Duration::from_secs(30)
}

fn media_kind(kind: KindArg) -> MediaKind {
    match kind {
        KindArg::Image => MediaKind::Image,
        KindArg::Video => MediaKind::Video,
    }
}

fn now_ms() -> u64 {
    u64::try_from(Utc::now().timestamp_millis()).unwrap_or(0)
}

fn print_lines(lines: Vec<String>) {
    for line in lines {
        println!("{line}");
    }
}

fn print_job(state: &AppState, job_id: &JobId) {
    if let Some(row) = state.view().jobs.iter().find(|row| &row.job_id == job_id) {
        println!("{}", render::job_line(row));
    }
}

/// Core state plus the effect plumbing around it.
struct Session {
    state: AppState,
    store: StateFile,
    runner: Option<EffectRunner>,
}

impl Session {
    /// Restores saved state. With a runner attached, in-flight jobs resume.
    fn open(store: StateFile, runner: Option<EffectRunner>) -> Self {
        let mut session = Self {
            state: AppState::new(),
            store,
            runner,
        };
        let snapshot = load_snapshot(&session.store);
        session.dispatch(Msg::Restore(snapshot));
        session.state.consume_dirty();
        session
    }

    fn attach(&mut self, runner: EffectRunner) {
        self.runner = Some(runner);
    }

    fn runner(&self) -> anyhow::Result<&EffectRunner> {
        match &self.runner {
            Some(runner) => Ok(runner),
            None => bail!("tracker engine is not running"),
        }
    }

    fn dispatch(&mut self, msg: Msg) {
        let state = std::mem::take(&mut self.state);
        let (state, effects) = update(state, msg);
        self.state = state;

        for effect in &effects {
            match effect {
                Effect::Persist => save_snapshot(&self.store, &self.state.snapshot()),
                Effect::Notify(notification) => {
                    println!("{}", render::notification_line(notification))
                }
                other => {
                    if let Some(runner) = &self.runner {
                        runner.run(other, &self.state);
                    }
                }
            }
        }
    }

    /// Feeds engine events through `update` until `done` holds or time runs out.
    /// Returns whether `done` was reached.
    fn pump(
        &mut self,
        done: impl Fn(&AppState) -> bool,
        budget: Duration,
    ) -> anyhow::Result<bool> {
        let deadline = Instant::now() + budget;
        while !done(&self.state) {
            if Instant::now() >= deadline {
                return Ok(false);
            }
            let event = self.runner()?.next_event(TICK);
            match event.map(|event| map_event(event, now_ms())) {
                Some(Inbound::Msg(msg)) => self.dispatch(msg),
                Some(Inbound::SubmitFailed(message)) => {
                    bail!("generation request failed: {message}")
                }
                Some(Inbound::Ignored) => {}
                None => self.dispatch(Msg::Tick),
            }
            if self.state.consume_dirty() {
                tracker_debug!("{} jobs in flight", self.state.active_jobs().count());
            }
        }
        Ok(true)
    }

    fn await_submission(&mut self, budget: Duration) -> anyhow::Result<JobId> {
        let deadline = Instant::now() + budget;
        while Instant::now() < deadline {
            let Some(event) = self.runner()?.next_event(TICK) else {
                continue;
            };
            match map_event(event, now_ms()) {
                Inbound::Msg(msg) => {
                    let submitted = match &msg {
                        Msg::Submitted { job_id, .. } => Some(job_id.clone()),
                        _ => None,
                    };
                    self.dispatch(msg);
                    if let Some(job_id) = submitted {
                        return Ok(job_id);
                    }
                }
                Inbound::SubmitFailed(message) => bail!("generation request failed: {message}"),
                Inbound::Ignored => {}
            }
        }
        bail!("no answer from the generation backend")
    }

    /// Waits for one job to settle, then prints where it ended up.
    fn follow(&mut self, job_id: &JobId, budget: Duration) -> anyhow::Result<()> {
        let settled = self.pump(
            |state| {
                state
                    .job(job_id)
                    .map_or(true, |job| job.status.is_terminal())
            },
            budget,
        )?;
        if !settled {
            tracker_info!("stopped waiting for {}", job_id);
        }
        print_job(&self.state, job_id);
        Ok(())
    }

    /// Stops the engine and writes the final snapshot.
    fn finish(self) {
        save_snapshot(&self.store, &self.state.snapshot());
        if let Some(runner) = self.runner {
            runner.shutdown();
        }
    }
}
