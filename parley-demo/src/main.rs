//! Parley terminal host.
//!
//! Drives one room session from stdin. Usage:
//!
//! ```text
//! parley-demo [user] [room] [password]
//! ```
//!
//! Lines starting with `/` are commands (`/connect`, `/disconnect`,
//! `/debug`, `/arm n`, `/disarm n`, `/retract n`, `/quit`); anything else
//! is sent as a message.

mod commands;
mod printer;

use std::error::Error;

use log::info;
use parley_collab::{ConnectionState, Session, SessionConfig, YrsEngine};
use parley_core::HandleId;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::time::Instant;

use commands::Command;
use printer::Printer;

struct Args {
    user: String,
    room: String,
    password: String,
}

impl Args {
    fn from_env() -> Self {
        let mut args = std::env::args().skip(1);
        Self {
            user: args.next().unwrap_or_else(|| "Ben".to_string()),
            room: args.next().unwrap_or_else(|| "hello-there".to_string()),
            password: args.next().unwrap_or_default(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();

    let args = Args::from_env();
    let mut session = Session::new(YrsEngine::new(), SessionConfig::default());
    session.mount(Box::new(Printer))?;

    info!("Parley demo for '{}' in room '{}'", args.user, args.room);
    println!("{}", session.input().placeholder());

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let deadline = session.ready_deadline();
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = wait_until(deadline) => {
                match session.poll_ready(Instant::now()) {
                    Ok(true) => println!("{}", session.banner()),
                    Ok(false) => {}
                    Err(e) => eprintln!("error: {e}"),
                }
                continue;
            }
        };
        let Some(line) = line else { break };

        match commands::parse(&line) {
            Ok(Command::Quit) => break,
            Ok(command) => {
                if let Err(e) = run(&mut session, &args, command) {
                    eprintln!("error: {e}");
                }
            }
            Err(e) => eprintln!("error: {e}"),
        }
    }

    if session.connection_state() != ConnectionState::Disconnected {
        session.disconnect()?;
    }
    Ok(())
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

fn run(session: &mut Session<YrsEngine>, args: &Args, command: Command) -> Result<(), Box<dyn Error>> {
    match command {
        Command::Connect => {
            session.connect(&args.user, &args.room, &args.password)?;
            println!("{}", session.banner());
        }
        Command::Disconnect => {
            session.disconnect()?;
            println!("{}", session.input().placeholder());
        }
        Command::Debug => match session.transcript() {
            Some(events) => {
                for (position, event) in events.iter().enumerate() {
                    println!("{position:>3} {}", serde_json::to_string(event)?);
                }
                let (deltas, ops) = session.interpreter_stats();
                println!("({deltas} deltas, {ops} ops applied)");
                if let Some(fault) = session.fault() {
                    println!("halted: {fault}");
                }
            }
            None => println!("(no session yet)"),
        },
        Command::Arm(position) => {
            let handle = handle_at(session, position)?;
            session.pointer_enter(handle);
        }
        Command::Disarm(position) => {
            let handle = handle_at(session, position)?;
            session.pointer_leave(handle);
        }
        Command::Retract(position) => {
            let handle = handle_at(session, position)?;
            if session.confirm_retract(handle)?.is_none() {
                println!("nothing to delete at {position}");
            }
        }
        Command::Send(text) => {
            session.send_message(&text)?;
        }
        Command::Quit => {}
    }
    Ok(())
}

fn handle_at(session: &Session<YrsEngine>, position: usize) -> Result<HandleId, Box<dyn Error>> {
    session
        .units()
        .get(position)
        .map(|unit| unit.handle())
        .ok_or_else(|| format!("no message at position {position}").into())
}
