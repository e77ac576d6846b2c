use std::collections::VecDeque;
use std::io::{BufRead, Lines, Write};
use std::time::{Duration, Instant};

use exchange_core::{
    segment_at_pointer, GiftPrize, MatchError, RevealSession, SpinConfig, SpinEngine, SpinFrame,
    TurnPhase, DEFAULT_MAX_ATTEMPTS,
};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("usage: santa-wheel [--seed N] [--json] NAME NAME [NAME...]")]
    Usage,
    #[error("duplicate participant: {0}")]
    DuplicateName(String),
    #[error(transparent)]
    Match(#[from] MatchError),
    #[error("encode error: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Options {
    pub names: Vec<String>,
    pub seed: Option<u64>,
    pub json: bool,
}

pub fn parse_args<I>(args: I) -> Result<Options, CliError>
where
    I: IntoIterator<Item = String>,
{
    let mut names = Vec::new();
    let mut seed = None;
    let mut json = false;

    let mut args = args.into_iter();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--seed" => {
                let value = args.next().ok_or(CliError::Usage)?;
                seed = Some(value.parse().map_err(|_| CliError::Usage)?);
            }
            "--json" => json = true,
            flag if flag.starts_with("--") => return Err(CliError::Usage),
            name => {
                let name = name.trim();
                if name.is_empty() {
                    continue;
                }
                if names.iter().any(|existing| existing == name) {
                    return Err(CliError::DuplicateName(name.to_string()));
                }
                names.push(name.to_string());
            }
        }
    }

    Ok(Options { names, seed, json })
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum SessionMessage<'a> {
    Turn {
        giver: &'a str,
    },
    Revealed {
        giver: &'a str,
        receiver: &'a str,
        gift: GiftPrize,
    },
    Complete,
}

/// Delivers display frames during an active spin. `next_frame` waits
/// for the next frame and reports wall-clock time since `begin`, so
/// the engine sees elapsed time rather than a frame count.
pub trait FrameScheduler {
    fn begin(&mut self);
    fn next_frame(&mut self) -> Duration;
}

/// Real scheduler: a fixed sleep between frames, elapsed measured
/// against a monotonic clock.
pub struct DisplayFrames {
    interval: Duration,
    started: Instant,
}

impl DisplayFrames {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            started: Instant::now(),
        }
    }
}

impl FrameScheduler for DisplayFrames {
    fn begin(&mut self) {
        self.started = Instant::now();
    }

    fn next_frame(&mut self) -> Duration {
        std::thread::sleep(self.interval);
        self.started.elapsed()
    }
}

/// Test scheduler: replays queued elapsed values, then jumps past any
/// finite spin duration.
pub struct ScriptedFrames {
    frames: VecDeque<Duration>,
}

impl ScriptedFrames {
    pub fn new(frames: impl IntoIterator<Item = Duration>) -> Self {
        Self {
            frames: frames.into_iter().collect(),
        }
    }
}

impl FrameScheduler for ScriptedFrames {
    fn begin(&mut self) {}

    fn next_frame(&mut self) -> Duration {
        self.frames.pop_front().unwrap_or(Duration::MAX)
    }
}

enum Command {
    Proceed,
    Quit,
    Reset,
}

fn read_command<B: BufRead>(lines: &mut Lines<B>) -> Result<Command, CliError> {
    match lines.next() {
        None => Ok(Command::Quit),
        Some(line) => Ok(match line?.trim() {
            "q" | "quit" => Command::Quit,
            "r" | "reset" => Command::Reset,
            _ => Command::Proceed,
        }),
    }
}

fn emit<W: Write>(
    out: &mut W,
    json: bool,
    message: &SessionMessage<'_>,
    plain: &str,
) -> Result<(), CliError> {
    if json {
        writeln!(out, "{}", serde_json::to_string(message)?)?;
    } else {
        writeln!(out, "{plain}")?;
    }
    Ok(())
}

fn render_wheel<W: Write>(out: &mut W, rotation: f64, labels: &[String]) -> Result<(), CliError> {
    let label = labels
        .get(segment_at_pointer(rotation, labels.len()))
        .map(String::as_str)
        .unwrap_or("?");
    let degrees = rotation.to_degrees() % 360.0;
    write!(out, "\r  [{degrees:>6.1}°] ▼ {label:<24}")?;
    out.flush()?;
    Ok(())
}

fn run_spin<W: Write, S: FrameScheduler>(
    engine: &mut SpinEngine,
    scheduler: &mut S,
    labels: &[String],
    json: bool,
    out: &mut W,
) -> Result<(), CliError> {
    scheduler.begin();
    loop {
        match engine.step(scheduler.next_frame()) {
            SpinFrame::Idle => return Ok(()),
            SpinFrame::Turning(rotation) => {
                if !json {
                    render_wheel(out, rotation, labels)?;
                }
            }
            SpinFrame::Landed { rotation, .. } => {
                if !json {
                    render_wheel(out, rotation, labels)?;
                    writeln!(out)?;
                }
                return Ok(());
            }
        }
    }
}

/// Interactive reveal session. In `--json` mode there are no prompts:
/// the session auto-advances and emits one tagged JSON line per event.
pub fn run<R, W, S>(opts: &Options, input: R, mut out: W, scheduler: &mut S) -> Result<(), CliError>
where
    R: BufRead,
    W: Write,
    S: FrameScheduler,
{
    let mut rng = match opts.seed {
        Some(seed) => ChaCha8Rng::seed_from_u64(seed),
        None => ChaCha8Rng::from_entropy(),
    };
    let mut session = RevealSession::new(&opts.names, DEFAULT_MAX_ATTEMPTS, &mut rng)?;
    let mut engine = SpinEngine::new(SpinConfig::default());
    let labels: Vec<String> = session.givers().map(str::to_string).collect();
    log::info!("reveal session started with {} participants", labels.len());

    let mut lines = input.lines();
    loop {
        match session.phase() {
            TurnPhase::AwaitingSpin => {
                let giver = match session.current_giver() {
                    Some(giver) => giver.to_string(),
                    None => break,
                };
                emit(
                    &mut out,
                    opts.json,
                    &SessionMessage::Turn { giver: &giver },
                    &format!("It's {giver}'s turn! Press Enter to spin (q quits, r rematches)."),
                )?;

                if !opts.json {
                    match read_command(&mut lines)? {
                        Command::Quit => break,
                        Command::Reset => {
                            if session.reset_allowed() {
                                session =
                                    RevealSession::new(&opts.names, DEFAULT_MAX_ATTEMPTS, &mut rng)?;
                                log::info!("session rematched from the start");
                            }
                            continue;
                        }
                        Command::Proceed => {}
                    }
                }

                let Some(target) = session.begin_spin() else {
                    continue;
                };
                if !engine.start(target.segment, labels.len(), &mut rng) {
                    session.abort_spin();
                    continue;
                }
                run_spin(&mut engine, scheduler, &labels, opts.json, &mut out)?;

                let Some(reveal) = session.complete_spin(&mut rng) else {
                    continue;
                };
                emit(
                    &mut out,
                    opts.json,
                    &SessionMessage::Revealed {
                        giver: &reveal.giver,
                        receiver: &reveal.receiver,
                        gift: reveal.gift,
                    },
                    &format!(
                        "{}, you got {}! Gift: {}",
                        reveal.giver, reveal.receiver, reveal.gift.name
                    ),
                )?;
            }
            TurnPhase::Revealed => {
                if !opts.json {
                    writeln!(out, "Press Enter for the next person (q quits).")?;
                    match read_command(&mut lines)? {
                        Command::Quit => break,
                        // Reset is not allowed mid-reveal; ignore it.
                        Command::Reset => continue,
                        Command::Proceed => {}
                    }
                }
                session.advance();
            }
            TurnPhase::Spinning => {
                // Unreachable from this driver; recover rather than hang.
                session.abort_spin();
            }
            TurnPhase::Complete => {
                emit(
                    &mut out,
                    opts.json,
                    &SessionMessage::Complete,
                    "All gifts assigned! Game over.",
                )?;
                break;
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn opts(names: &[&str], seed: u64, json: bool) -> Options {
        Options {
            names: names.iter().map(|s| s.to_string()).collect(),
            seed: Some(seed),
            json,
        }
    }

    fn run_to_string(opts: &Options, input: &str) -> (Result<(), CliError>, String) {
        let mut out = Vec::new();
        let mut scheduler = ScriptedFrames::new([]);
        let result = run(opts, input.as_bytes(), &mut out, &mut scheduler);
        (result, String::from_utf8(out).unwrap())
    }

    #[test]
    fn parse_args_collects_trimmed_unique_names() {
        let parsed = parse_args(args(&[" ann ", "bob", ""])).unwrap();
        assert_eq!(parsed.names, vec!["ann".to_string(), "bob".to_string()]);
        assert_eq!(parsed.seed, None);
        assert!(!parsed.json);
    }

    #[test]
    fn parse_args_reads_flags() {
        let parsed = parse_args(args(&["--seed", "42", "--json", "ann", "bob"])).unwrap();
        assert_eq!(parsed.seed, Some(42));
        assert!(parsed.json);
        assert_eq!(parsed.names.len(), 2);
    }

    #[test]
    fn parse_args_rejects_bad_input() {
        assert!(matches!(
            parse_args(args(&["--seed"])),
            Err(CliError::Usage)
        ));
        assert!(matches!(
            parse_args(args(&["--seed", "not-a-number", "ann"])),
            Err(CliError::Usage)
        ));
        assert!(matches!(
            parse_args(args(&["--wat", "ann", "bob"])),
            Err(CliError::Usage)
        ));
        assert!(matches!(
            parse_args(args(&["ann", "ann"])),
            Err(CliError::DuplicateName(name)) if name == "ann"
        ));
    }

    #[test]
    fn full_session_reaches_completion() {
        let opts = opts(&["A", "B", "C"], 42, false);
        let (result, output) = run_to_string(&opts, "\n\n\n\n\n\n\n\n");
        result.unwrap();

        for name in ["A", "B", "C"] {
            assert!(
                output.contains(&format!("It's {name}'s turn!")),
                "missing turn for {name}: {output}"
            );
        }
        assert_eq!(output.matches("you got").count(), 3);
        assert!(output.contains("All gifts assigned! Game over."));
    }

    #[test]
    fn seeded_sessions_are_reproducible() {
        let opts = opts(&["A", "B", "C", "D"], 7, false);
        let (_, first) = run_to_string(&opts, "\n\n\n\n\n\n\n\n\n\n");
        let (_, second) = run_to_string(&opts, "\n\n\n\n\n\n\n\n\n\n");
        assert_eq!(first, second);
    }

    #[test]
    fn quitting_stops_before_any_reveal() {
        let opts = opts(&["A", "B"], 1, false);
        let (result, output) = run_to_string(&opts, "q\n");
        result.unwrap();
        assert_eq!(output.matches("turn!").count(), 1);
        assert!(!output.contains("you got"));
        assert!(!output.contains("All gifts assigned"));
    }

    #[test]
    fn eof_counts_as_quit() {
        let opts = opts(&["A", "B"], 1, false);
        let (result, output) = run_to_string(&opts, "");
        result.unwrap();
        assert!(!output.contains("you got"));
    }

    #[test]
    fn rematch_restarts_at_the_first_turn() {
        let opts = opts(&["A", "B", "C"], 3, false);
        let (result, output) = run_to_string(&opts, "r\nq\n");
        result.unwrap();
        assert_eq!(output.matches("turn!").count(), 2);
        assert!(!output.contains("you got"));
    }

    #[test]
    fn json_mode_emits_tagged_lines() {
        let opts = opts(&["A", "B", "C"], 42, true);
        let (result, output) = run_to_string(&opts, "");
        result.unwrap();

        let lines: Vec<serde_json::Value> = output
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(lines.len(), 7);
        assert_eq!(
            lines.iter().filter(|v| v["type"] == "turn").count(),
            3
        );
        assert_eq!(
            lines.iter().filter(|v| v["type"] == "revealed").count(),
            3
        );
        assert_eq!(lines.last().unwrap()["type"], "complete");

        let revealed: Vec<&serde_json::Value> =
            lines.iter().filter(|v| v["type"] == "revealed").collect();
        for reveal in revealed {
            assert_ne!(reveal["giver"], reveal["receiver"]);
            assert!(reveal["gift"]["name"].is_string());
            assert!(reveal["gift"]["image"].is_string());
        }
    }

    #[test]
    fn too_few_names_fails_before_the_session_starts() {
        let opts = opts(&["A"], 0, false);
        let (result, output) = run_to_string(&opts, "\n");
        assert!(matches!(
            result,
            Err(CliError::Match(MatchError::InsufficientParticipants))
        ));
        assert!(output.is_empty());
    }
}
