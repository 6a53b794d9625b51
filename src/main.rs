mod cli;
mod signal;

use anyhow::Context;
use cli::Cli;
use proclaunch::handlers::{Cmd, Env, Group, LogFailures, StartDir, StdErr, StdIn, StdOut};
use proclaunch::{AsyncPipe, ChildHandle, Executor, LaunchError};
use signal::{forward_signal_to_child, setup_signal_handlers, SignalFlags};
use std::io::Write;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};

/// How often the wait loops look at the signal flags.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

fn main() {
    std::process::exit(run());
}

fn run() -> i32 {
    let args = Cli::parse_args();
    init_logging(&args);

    if let Err(e) = args.validate() {
        eprintln!("proclaunch: {}", e);
        eprintln!("Use \"proclaunch -h\" to get help");
        return e.exit_code();
    }

    let signal_flags = match setup_signal_handlers() {
        Ok(flags) => flags,
        Err(e) => {
            eprintln!("proclaunch: {}", e);
            return e.exit_code();
        }
    };

    match run_program(&args, &signal_flags) {
        Ok(exit_code) => {
            log::debug!("Child exited with code {}", exit_code);
            exit_code
        }
        Err(e) => {
            eprintln!("proclaunch: {:#}", e);
            e.downcast_ref::<LaunchError>()
                .map(LaunchError::exit_code)
                .unwrap_or(1)
        }
    }
}

fn init_logging(args: &Cli) {
    let mut builder = env_logger::Builder::from_default_env();
    if let Some(level) = args.log_level() {
        builder.filter_level(level);
    }
    builder.format_timestamp(None).init();
}

fn build_env(args: &Cli) -> anyhow::Result<Env> {
    let mut env = if args.clear_env {
        Env::cleared()
    } else {
        Env::new()
    };
    for key in &args.unset {
        env = env.remove(key);
    }
    for (key, value) in args.env_pairs()? {
        env = env.set(key, value);
    }
    Ok(env)
}

/// Launch the command and wait for it, returning its exit code.
fn run_program(args: &Cli, signal_flags: &SignalFlags) -> anyhow::Result<i32> {
    let (program, rest) = args
        .command
        .split_first()
        .context("No command specified")?;
    let cmd = Cmd::search(program)?.args(rest);

    let mut capture = if args.capture {
        Some(AsyncPipe::create().context("Failed to create capture pipe")?)
    } else {
        None
    };

    let mut executor = Executor::new()
        .with(cmd)
        .with(build_env(args)?)
        .with(LogFailures);
    if let Some(dir) = &args.work_dir {
        executor = executor.with(StartDir::new(dir));
    }
    if args.null_stdin {
        executor = executor.with(StdIn::null());
    }
    if args.quiet {
        executor = executor.with(StdOut::null()).with(StdErr::null());
    }
    if let Some(pipe) = capture.as_mut() {
        executor = executor.with(StdOut::pipe(pipe.as_pipe_mut()));
    }
    if args.merge_stderr {
        executor = executor.with(StdErr::to_stdout());
    }
    if args.group {
        executor = executor.with(Group::new());
    }

    let child = executor.launch()?;
    drop(executor);
    log::debug!("Spawned child process with PID: {}", child.get_pid());

    match capture {
        Some(pipe) => capture_output(pipe, child, signal_flags, args.group),
        None => Ok(wait_for_child(child, signal_flags, args.group)?),
    }
}

fn forward_pending_signal(child: &mut ChildHandle, signal_flags: &SignalFlags, group: bool) {
    if let Some(sig) = signal_flags.take_term_signal() {
        log::debug!("Received termination signal, forwarding to child");
        if let Err(e) = forward_signal_to_child(sig, child, group) {
            log::warn!("Failed to forward signal: {}", e);
        }
    }
}

/// Poll the child, passing on termination signals until it exits.
fn wait_for_child(
    mut child: ChildHandle,
    signal_flags: &SignalFlags,
    group: bool,
) -> proclaunch::Result<i32> {
    loop {
        forward_pending_signal(&mut child, signal_flags, group);
        if let Some(exit_code) = child.try_wait()? {
            return Ok(exit_code);
        }
        std::thread::sleep(POLL_INTERVAL);
    }
}

/// Copy the child's stdout to ours line by line until EOF, then wait.
fn capture_output(
    pipe: AsyncPipe,
    child: ChildHandle,
    signal_flags: &SignalFlags,
    group: bool,
) -> anyhow::Result<i32> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_io()
        .enable_time()
        .build()
        .context("Failed to start the async runtime")?;
    runtime.block_on(copy_lines(pipe, child, signal_flags, group))
}

async fn copy_lines(
    pipe: AsyncPipe,
    mut child: ChildHandle,
    signal_flags: &SignalFlags,
    group: bool,
) -> anyhow::Result<i32> {
    let mut reader = BufReader::new(pipe.into_source()?);
    let mut line = Vec::new();
    let stdout = std::io::stdout();

    loop {
        forward_pending_signal(&mut child, signal_flags, group);
        // read_until keeps partial data in `line` when the timeout fires
        match tokio::time::timeout(POLL_INTERVAL, reader.read_until(b'\n', &mut line)).await {
            Ok(Ok(0)) => break,
            Ok(Ok(_)) => {
                let mut out = stdout.lock();
                out.write_all(&line)?;
                out.flush()?;
                line.clear();
            }
            Ok(Err(e)) => return Err(e).context("Failed to read child output"),
            Err(_elapsed) => {}
        }
    }
    if !line.is_empty() {
        stdout.lock().write_all(&line)?;
    }
    log::trace!("Child closed its stdout");

    loop {
        forward_pending_signal(&mut child, signal_flags, group);
        if let Some(exit_code) = child.try_wait()? {
            return Ok(exit_code);
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}
