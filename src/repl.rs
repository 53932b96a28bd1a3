//! The interactive session: one full turn per input line. Free text goes
//! through the planner; a literal `<operation> <json-args>` line goes
//! straight to the dispatcher. The only cross-turn state is the dataset
//! context.

use color_eyre::Result;
use serde_json::{Map, Value, json};
use signal_hook::consts::SIGINT;
use std::io::{self, BufRead, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, error};

use crate::config::Config;
use crate::context::DatasetContext;
use crate::dispatch::{Dispatcher, OperationResult};
use crate::errors::AnalystError;
use crate::plan::{self, Invocation};
use crate::planner::Planner;
use crate::registry::OperationName;
use crate::render::TextRenderer;

pub struct Session {
    ctx: DatasetContext,
    dispatcher: Dispatcher,
    planner: Planner,
}

impl Session {
    pub fn new(config: &Config) -> Result<Self> {
        Ok(Self {
            ctx: DatasetContext::new(),
            dispatcher: Dispatcher::new(Box::new(TextRenderer::default())),
            planner: Planner::from_config(&config.planner)?,
        })
    }

    pub fn operation_names(&self) -> Vec<String> {
        self.dispatcher.registry().names()
    }

    /// Load a dataset before the first turn (the `--load` flag).
    pub fn load_dataset(&mut self, path: &str) -> OperationResult {
        let mut arguments = Map::new();
        arguments.insert("path".into(), json!(path));
        let invocation = Invocation {
            operation: OperationName::LoadData,
            arguments,
            rationale: None,
            follow_up: None,
        };
        self.dispatcher.execute(&invocation, &mut self.ctx)
    }

    /// Read-eval loop. `exit`/`quit` and EOF end the session; SIGINT ends it
    /// cleanly without dispatching anything further.
    pub fn run(&mut self) -> Result<()> {
        let interrupted = Arc::new(AtomicBool::new(false));
        signal_hook::flag::register(SIGINT, Arc::clone(&interrupted))?;

        let stdin = io::stdin();
        let mut line = String::new();
        loop {
            if interrupted.load(Ordering::Relaxed) {
                break;
            }
            print!("\nyou> ");
            io::stdout().flush()?;
            line.clear();
            match stdin.lock().read_line(&mut line) {
                Ok(0) => break,
                Ok(_) => {}
                // Signal during read: loop around and check the flag.
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
            let input = line.trim();
            if input.is_empty() {
                continue;
            }
            if input.eq_ignore_ascii_case("exit") || input.eq_ignore_ascii_case("quit") {
                break;
            }
            if let Err(e) = self.turn(input) {
                // Transport failure ends the turn, never the session.
                error!(error = %e, "turn aborted");
                eprintln!("planner error: {e}");
            }
        }
        println!("bye.");
        Ok(())
    }

    /// One full turn: propose (unless the line is a direct invocation),
    /// validate, dispatch, report.
    pub fn turn(&mut self, input: &str) -> Result<()> {
        let candidate = match self.direct_candidate(input) {
            Some(direct) => direct,
            None => {
                let raw = self
                    .planner
                    .propose(input, &self.dispatcher.registry().names())?;
                debug!(raw = %raw, "planner candidate");
                plan::validate(&raw, self.dispatcher.registry())
            }
        };

        match candidate {
            Ok(invocation) => {
                println!(
                    "plan: {} {}",
                    invocation.operation,
                    Value::Object(invocation.arguments.clone())
                );
                if let Some(reason) = &invocation.rationale {
                    println!("reason: {reason}");
                }
                let result = self.dispatcher.execute(&invocation, &mut self.ctx);
                println!("{:#}", result.to_value());
                if let Some(next) = &invocation.follow_up {
                    println!("next: {next}");
                }
            }
            Err(err) => {
                println!("{:#}", OperationResult::Failure(err).to_value());
            }
        }
        Ok(())
    }

    /// A line whose first token names an operation bypasses planning. The
    /// rest of the line, if any, must be the JSON arguments object.
    fn direct_candidate(&self, input: &str) -> Option<Result<Invocation, AnalystError>> {
        let mut parts = input.splitn(2, char::is_whitespace);
        let head = parts.next()?;
        self.dispatcher.registry().resolve(head)?;

        let rest = parts.next().unwrap_or("").trim();
        let args: Value = if rest.is_empty() {
            Value::Object(Map::new())
        } else {
            match serde_json::from_str(rest) {
                Ok(value) => value,
                Err(e) => {
                    return Some(Err(AnalystError::InvalidPlanSyntax {
                        detail: format!("arguments are not valid JSON ({e})"),
                        raw: input.to_string(),
                    }));
                }
            }
        };
        let candidate = json!({ "tool": head, "args": args });
        Some(plan::validate_value(&candidate, input, self.dispatcher.registry()))
    }
}
