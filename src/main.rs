use clap::Parser;
use fleet_counter::commands::console::{spawn_stdin_reader, PROMPT};
use fleet_counter::commands::{Cli, Console, ConsoleReply, LaunchMode};
use fleet_counter::config::FleetConfig;
use fleet_counter::error::{errors, FleetError, FleetResult};
use fleet_counter::logging::{info, warn};
use fleet_counter::signal::{ShutdownReason, ShutdownSignals};
use fleet_counter::utils::logger::init_logger;
use fleet_counter::worker::run_worker;
use fleet_counter::{
    CounterEngine, CounterEvent, FleetContext, ProcessSupervisor, SelfExecLauncher, WorkerKind,
};
use std::io::{self, Write};
use std::process::ExitCode;
use std::sync::Arc;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // 初始化日志系统
    if let Err(err) = init_logger(cli.log_level.as_deref(), cli.diagnostic_log.clone()) {
        eprintln!("failed to initialize logging: {err:#}");
        return ExitCode::from(1);
    }

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{}", err.user_message());
            ExitCode::from(1)
        }
    }
}

async fn run(cli: Cli) -> FleetResult<()> {
    let config = cli.resolve_config()?;
    match cli.mode() {
        LaunchMode::Worker(kind) => run_worker_mode(config, kind).await,
        LaunchMode::Participant => run_participant(config).await,
    }
}

async fn run_worker_mode(config: FleetConfig, kind: WorkerKind) -> FleetResult<()> {
    tokio::task::spawn_blocking(move || {
        let ctx = FleetContext::attach_worker(config)?;
        run_worker(&ctx, kind).map(|_| ())
    })
    .await
    .map_err(join_error)?
}

async fn run_participant(config: FleetConfig) -> FleetResult<()> {
    let mut signals = ShutdownSignals::install()
        .map_err(|err| errors::resource_error("cannot install signal handlers", "signal", err))?;

    let ctx = tokio::task::spawn_blocking(move || FleetContext::attach(config))
        .await
        .map_err(join_error)??;
    let ctx = Arc::new(ctx);

    let leader = ctx.is_current_leader()?;
    ctx.events().record_or_warn(CounterEvent::MainStart {
        pid: ctx.pid(),
        leader,
    });
    ctx.refresh()?;

    let supervisor = if leader {
        Some(ProcessSupervisor::new(SelfExecLauncher::from_config(ctx.config())?))
    } else {
        None
    };
    let engine = CounterEngine::start(Arc::clone(&ctx), supervisor)?;

    let console = Console::new(Arc::clone(&ctx));
    print!("{}", console.banner());
    let mut lines = spawn_stdin_reader()
        .map_err(|err| errors::resource_error("cannot start console reader", "thread", err))?;
    prompt();

    let reason = loop {
        tokio::select! {
            line = lines.recv() => match line {
                Some(line) => {
                    let mut stdout = io::stdout();
                    match console.execute(&line, &mut stdout) {
                        Ok(ConsoleReply::Exit) => break ShutdownReason::Console,
                        Ok(ConsoleReply::Continue) => prompt(),
                        Err(err) => warn(format!("console output failed: {err}")),
                    }
                }
                None => break ShutdownReason::Console,
            },
            reason = signals.recv() => break reason,
        }
    };

    info(format!("PID={} shutting down ({reason})", ctx.pid()));
    ctx.request_shutdown();
    tokio::task::spawn_blocking(move || engine.stop())
        .await
        .map_err(join_error)?;

    let value = ctx.refresh().unwrap_or_else(|_| ctx.cached_value());
    ctx.events().record_or_warn(CounterEvent::MainExit {
        pid: ctx.pid(),
        value,
    });

    drop(console);
    if Arc::strong_count(&ctx) > 1 {
        warn("fleet context still shared at exit");
    }
    drop(ctx);
    Ok(())
}

fn prompt() {
    let mut stdout = io::stdout();
    let _ = write!(stdout, "{PROMPT}");
    let _ = stdout.flush();
}

fn join_error(err: tokio::task::JoinError) -> FleetError {
    errors::resource_error("background task failed", "task", err)
}
