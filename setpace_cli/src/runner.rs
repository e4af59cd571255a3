//! Interactive block runner.
//!
//! Drives a [`BlockSession`] from line commands. Input is read on its own
//! thread so the session is polled every `poll_interval` whether or not the
//! user types anything.

use crate::commands::{self, Command, HELP};
use setpace_core::history::RecommendationSource;
use setpace_core::protocol::ProtocolState;
use setpace_core::{
    BlockResult, BlockSession, Cue, CuePlayer, FinishOutcome, Protocol, Result, RoundOutcome,
    SessionEvent,
};
use std::io::{self, BufRead, Write};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread;
use std::time::Duration;

/// Rings the terminal bell on stderr for every cue
pub struct TerminalCues;

impl CuePlayer for TerminalCues {
    fn play(&self, cue: Cue) {
        eprint!("\x07");
        tracing::debug!("Cue: {:?}", cue);
    }
}

/// Read lines on a background thread. The channel closes at end of input.
pub fn spawn_line_reader<R: BufRead + Send + 'static>(input: R) -> Receiver<io::Result<String>> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        for line in input.lines() {
            if tx.send(line).is_err() {
                break;
            }
        }
    });
    rx
}

pub struct Runner<W: Write> {
    out: W,
    assume_yes: bool,
    poll_interval: Duration,
}

impl<W: Write> Runner<W> {
    pub fn new(out: W, assume_yes: bool, poll_interval: Duration) -> Self {
        Self {
            out,
            assume_yes,
            poll_interval,
        }
    }

    /// Run until `finish`, `abandon` or end of input.
    /// Returns the result when the block was finished.
    pub fn run(
        &mut self,
        mut session: BlockSession,
        lines: Receiver<io::Result<String>>,
    ) -> Result<Option<BlockResult>> {
        self.print_header(&session)?;

        loop {
            let line = match lines.recv_timeout(self.poll_interval) {
                Ok(line) => line?,
                Err(RecvTimeoutError::Timeout) => {
                    self.print_events(&mut session)?;
                    continue;
                }
                Err(RecvTimeoutError::Disconnected) => break,
            };
            self.print_events(&mut session)?;

            let command = match commands::parse(&line) {
                Ok(Some(command)) => command,
                Ok(None) => continue,
                Err(e) => {
                    writeln!(self.out, "error: {}", e)?;
                    continue;
                }
            };

            match command {
                Command::Finish => {
                    let confirmed = self.assume_yes;
                    match session.finish(confirmed) {
                        FinishOutcome::Completed(result) => return Ok(Some(result)),
                        FinishOutcome::NeedsConfirmation(pending) => {
                            writeln!(self.out, "Nothing was recorded. Finish anyway? [y/N]")?;
                            let answer = match lines.recv() {
                                Ok(answer) => answer?,
                                Err(_) => String::new(),
                            };
                            if answer.trim().eq_ignore_ascii_case("y") {
                                return Ok(pending.finish(true).into_result());
                            }
                            writeln!(self.out, "Continuing block.")?;
                            session = *pending;
                        }
                    }
                }
                Command::Abandon => {
                    writeln!(self.out, "Block abandoned. Nothing saved.")?;
                    return Ok(None);
                }
                command => {
                    if let Err(e) = self.apply(&mut session, command) {
                        writeln!(self.out, "error: {}", e)?;
                    }
                }
            }

            self.print_events(&mut session)?;
        }

        tracing::info!("Input ended before finish; abandoning block");
        writeln!(self.out, "Input ended. Block abandoned. Nothing saved.")?;
        Ok(None)
    }

    fn apply(&mut self, session: &mut BlockSession, command: Command) -> Result<()> {
        match command {
            Command::Start => {
                session.start()?;
                writeln!(self.out, "Clock started.")?;
            }
            Command::Pause => {
                session.pause();
                writeln!(self.out, "Clock paused at {}.", mmss(session.clock().elapsed_secs()))?;
            }
            Command::Status => self.print_status(session)?,
            Command::Wait(secs) => self.wait(session, secs)?,
            Command::Count { exercise, delta } => {
                let count = session.add_count(exercise, delta)?;
                writeln!(self.out, "{}: {}", name(session, exercise), count)?;
            }
            Command::Reps { exercise, text } => {
                let count = session.set_count(exercise, &text)?;
                writeln!(self.out, "{}: {}", name(session, exercise), count)?;
            }
            Command::Stage { exercise, text } => {
                let value = session.stage_value(exercise, &text)?;
                writeln!(
                    self.out,
                    "Next {} set: {}",
                    name(session, exercise),
                    value.map_or("default".to_string(), |v| v.to_string())
                )?;
            }
            Command::Weight { exercise, text } => {
                let weight = session.stage_weight(exercise, &text)?;
                writeln!(
                    self.out,
                    "Next {} weight: {}",
                    name(session, exercise),
                    weight.map_or("last used".to_string(), |w| w.to_string())
                )?;
            }
            Command::Done {
                exercise,
                value,
                skip_rest,
            } => {
                let entry = session.complete_set(exercise, value, skip_rest)?;
                writeln!(
                    self.out,
                    "Logged {} set {}/{}: {} @ {}",
                    name(session, exercise),
                    entry.set_index + 1,
                    session.target_sets(exercise),
                    entry.value,
                    entry.weight
                )?;
                self.print_rest(session)?;
            }
            Command::Edit { exercise, set } => {
                session.edit_set(exercise, set)?;
                writeln!(self.out, "Editing {} set {}.", name(session, exercise), set + 1)?;
            }
            Command::Update {
                exercise,
                set,
                field,
                text,
            } => {
                session.update_set_result(exercise, set, field, &text)?;
                if let Some(entry) = session.ledger().get(exercise, set) {
                    writeln!(
                        self.out,
                        "{} set {} is now {} @ {}",
                        name(session, exercise),
                        set + 1,
                        entry.value,
                        entry.weight
                    )?;
                }
            }
            Command::Undo { exercise, set } => {
                session.uncomplete_set(exercise, set)?;
                writeln!(self.out, "Removed {} set {}.", name(session, exercise), set + 1)?;
            }
            Command::Close => {
                session.close_edit();
                writeln!(self.out, "Edit closed.")?;
            }
            Command::Round { group, rest } => {
                let entries = session.complete_round(&group, rest)?;
                writeln!(self.out, "Round of '{}' logged ({} sets).", group, entries.len())?;
                self.print_rest(session)?;
            }
            Command::Skip => {
                if session.skip_rest() {
                    writeln!(self.out, "Rest skipped.")?;
                } else {
                    writeln!(self.out, "No rest running.")?;
                }
            }
            Command::Timer { exercise } => {
                if session.toggle_work_timer(exercise)? {
                    let secs = session.work_timer_remaining_secs(exercise).unwrap_or(0);
                    writeln!(self.out, "Work timer for {}: {}s", name(session, exercise), secs)?;
                } else {
                    writeln!(self.out, "Work timer for {} cancelled.", name(session, exercise))?;
                }
            }
            Command::Ok(round) => {
                session.set_round_outcome(round, Some(RoundOutcome::Success))?;
                writeln!(self.out, "Round {}: success", round)?;
            }
            Command::Fail(round) => {
                session.set_round_outcome(round, Some(RoundOutcome::Fail))?;
                writeln!(self.out, "Round {}: fail", round)?;
            }
            Command::Clear(round) => {
                session.set_round_outcome(round, None)?;
                writeln!(self.out, "Round {}: unset", round)?;
            }
            Command::Note(text) => {
                session.set_notes(text);
                writeln!(self.out, "Notes saved.")?;
            }
            Command::Help => writeln!(self.out, "{}", HELP)?,
            Command::Finish | Command::Abandon => {}
        }
        Ok(())
    }

    /// Let real time pass, polling at the configured interval
    fn wait(&mut self, session: &mut BlockSession, secs: u64) -> Result<()> {
        let total = Duration::from_secs(secs);
        let mut waited = Duration::ZERO;
        while waited < total {
            let step = self.poll_interval.min(total - waited);
            std::thread::sleep(step);
            waited += step;
            self.print_events(session)?;
        }
        Ok(())
    }

    fn print_events(&mut self, session: &mut BlockSession) -> Result<()> {
        for event in session.poll() {
            let line = match event {
                SessionEvent::TargetsMet => "All targets met. Clock paused.".to_string(),
                SessionEvent::TimeCapReached => "Time cap reached. Clock stopped.".to_string(),
                SessionEvent::CountdownFinished => "Time is up.".to_string(),
                SessionEvent::RoundStarted(round) => format!("Round {} started.", round),
                SessionEvent::EmomFinished => "EMOM finished.".to_string(),
                SessionEvent::AllSetsComplete => "All sets complete.".to_string(),
                SessionEvent::RestFinished => "Rest over.".to_string(),
                SessionEvent::WorkTimerFinished(exercise) => {
                    format!("Work timer for {} finished.", name(session, exercise))
                }
            };
            writeln!(self.out, "{}", line)?;
        }
        Ok(())
    }

    fn print_rest(&mut self, session: &BlockSession) -> Result<()> {
        if let (Some(rest), Some(secs)) = (session.active_rest(), session.rest_remaining_secs()) {
            let label = if rest.is_round_rest() { "Round rest" } else { "Rest" };
            writeln!(self.out, "{} {}s", label, secs)?;
        }
        Ok(())
    }

    fn print_header(&mut self, session: &BlockSession) -> Result<()> {
        let block = session.block();
        let title = if block.name.is_empty() { &block.id } else { &block.name };
        writeln!(self.out, "{} [{} · {}]", title, block.protocol, block.block_type.label())?;

        for (i, exercise) in block.exercises.iter().enumerate() {
            write!(self.out, "  {}. {}", i + 1, exercise.name)?;
            if let Some(rec) = session.recommendation(i) {
                let source = match &rec.source {
                    RecommendationSource::PreviousSeries => "last series".to_string(),
                    RecommendationSource::PreviousActual => "last actual".to_string(),
                    RecommendationSource::Context { matched, label } => {
                        format!("{:?} context {}", matched, label).to_lowercase()
                    }
                };
                write!(self.out, "  recommended {} ({})", rec.weight, source)?;
            }
            writeln!(self.out)?;
        }
        writeln!(self.out, "Type 'help' for commands.")?;
        Ok(())
    }

    fn print_status(&mut self, session: &BlockSession) -> Result<()> {
        let clock = session.clock();
        let state = if clock.is_running() { "running" } else { "paused" };
        match session.protocol_state() {
            ProtocolState::Emom(_) => {
                if let Some((round, left)) = session.protocol_state().emom_position(clock) {
                    writeln!(
                        self.out,
                        "Round {}/{} · {}s left · {}",
                        round,
                        session.protocol_state().emom_rounds().unwrap_or(0),
                        left,
                        state
                    )?;
                }
            }
            protocol => match protocol.remaining_secs(clock) {
                Some(left) => writeln!(self.out, "Remaining {} · {}", mmss(left), state)?,
                None => writeln!(self.out, "Elapsed {} · {}", mmss(clock.elapsed_secs()), state)?,
            },
        }

        for (i, exercise) in session.block().exercises.iter().enumerate() {
            match session.protocol() {
                Protocol::Freeform => {
                    let next = session
                        .staged_value(i)
                        .map_or("-".to_string(), |v| v.to_string());
                    writeln!(
                        self.out,
                        "  {}. {}  sets {}/{}  next {} @ {}",
                        i + 1,
                        exercise.name,
                        session.committed(i),
                        session.target_sets(i),
                        next,
                        session
                            .staged_weight(i)
                            .or_else(|| session.ledger().last_weight(i))
                            .unwrap_or(0.0)
                    )?;
                }
                _ => writeln!(
                    self.out,
                    "  {}. {}  {}/{}",
                    i + 1,
                    exercise.name,
                    session.count(i),
                    exercise.rep_target()
                )?,
            }
        }

        if session.protocol() == Protocol::Emom {
            let marks: String = session
                .protocol_state()
                .round_outcomes()
                .iter()
                .map(|o| match o {
                    Some(RoundOutcome::Success) => '+',
                    Some(RoundOutcome::Fail) => 'x',
                    None => '.',
                })
                .collect();
            writeln!(self.out, "  rounds [{}]", marks)?;
        }

        self.print_rest(session)?;
        if let Some(editing) = session.editing() {
            writeln!(
                self.out,
                "  editing {} set {}",
                name(session, editing.exercise_index),
                editing.set_index + 1
            )?;
        }
        Ok(())
    }
}

fn name(session: &BlockSession, exercise_index: usize) -> String {
    session
        .block()
        .exercises
        .get(exercise_index)
        .map_or_else(|| format!("#{}", exercise_index + 1), |e| e.name.clone())
}

fn mmss(secs: u64) -> String {
    format!("{:02}:{:02}", secs / 60, secs % 60)
}
