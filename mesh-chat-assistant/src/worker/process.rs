//! The `assistant-worker` child process's run loop.
//!
//! Grounded on `other_examples/9c209cbc_..._worker_main.rs`'s shape: a
//! stdin-reader thread feeding a crossbeam channel, a main loop that drains
//! an outbound token channel into stdout between command reads, and a
//! per-request generation thread so the main loop stays responsive to
//! `Cancel`/`Shutdown` while a backend is blocked inside its own forward
//! pass.

use std::io::{self, BufRead, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam_channel as channel;

use super::backends::ChatBackend;
use super::protocol::{decode, encode, WorkerCommand, WorkerEvent};
use crate::error::Result;
use crate::models::TokenChunk;

type GenerationOutcome = (Box<dyn ChatBackend>, Result<()>);

/// Runs the worker process. Returns once `Shutdown` is received or stdin
/// closes (the parent process died).
pub fn run(backend: Box<dyn ChatBackend>) {
    let (stdin_tx, stdin_rx) = channel::unbounded::<String>();
    thread::spawn(move || {
        let stdin = io::stdin();
        for line in stdin.lock().lines() {
            match line {
                Ok(l) if !l.trim().is_empty() => {
                    if stdin_tx.send(l).is_err() {
                        break;
                    }
                }
                Ok(_) => {}
                Err(_) => break,
            }
        }
    });

    let (token_tx, token_rx) = channel::unbounded::<TokenChunk>();
    let cancel = Arc::new(AtomicBool::new(false));

    // `backend_slot` is `None` exactly while a generation thread owns it.
    let mut backend_slot = Some(backend);
    let mut generation: Option<thread::JoinHandle<GenerationOutcome>> = None;

    let stdout = io::stdout();
    let mut stdout = stdout.lock();

    loop {
        for chunk in token_rx.try_iter() {
            write_event(&mut stdout, &WorkerEvent::Chunk(chunk));
        }

        if let Some(handle) = &generation {
            if handle.is_finished() {
                let handle = generation.take().unwrap();
                let (backend, result) = handle
                    .join()
                    .unwrap_or_else(|_| panic!("worker generation thread panicked"));
                backend_slot = Some(backend);

                // The generation thread may have pushed its last chunk(s) in
                // the window between this iteration's drain above and the
                // `is_finished()` check just now — re-drain so nothing is
                // still sitting in the channel when `Done` goes out, which
                // would otherwise surface as chunks delivered after `Done`
                // on the next iteration.
                for chunk in token_rx.try_iter() {
                    write_event(&mut stdout, &WorkerEvent::Chunk(chunk));
                }

                if let Err(e) = result {
                    write_event(
                        &mut stdout,
                        &WorkerEvent::Error {
                            message: e.to_string(),
                        },
                    );
                }
                write_event(&mut stdout, &WorkerEvent::Done);
            }
        }

        let line = match stdin_rx.recv_timeout(Duration::from_millis(10)) {
            Ok(l) => l,
            Err(channel::RecvTimeoutError::Timeout) => continue,
            Err(channel::RecvTimeoutError::Disconnected) => break,
        };

        let command: WorkerCommand = match decode(&line) {
            Ok(c) => c,
            Err(e) => {
                write_event(
                    &mut stdout,
                    &WorkerEvent::Error {
                        message: format!("malformed command: {e}"),
                    },
                );
                continue;
            }
        };

        match command {
            WorkerCommand::Generate { history } => {
                let Some(mut backend) = backend_slot.take() else {
                    write_event(
                        &mut stdout,
                        &WorkerEvent::Error {
                            message: "generation already in progress".to_string(),
                        },
                    );
                    continue;
                };
                cancel.store(false, Ordering::Relaxed);
                let tx = token_tx.clone();
                let cancel = cancel.clone();
                generation = Some(thread::spawn(move || {
                    let result = backend.generate(&history, &tx, &cancel);
                    (backend, result)
                }));
            }
            WorkerCommand::Cancel => {
                cancel.store(true, Ordering::Relaxed);
            }
            WorkerCommand::Shutdown => {
                cancel.store(true, Ordering::Relaxed);
                if let Some(handle) = generation.take() {
                    let _ = handle.join();
                }
                break;
            }
        }
    }
}

fn write_event(stdout: &mut io::StdoutLock, event: &WorkerEvent) {
    if let Ok(json) = encode(event) {
        let _ = writeln!(stdout, "{json}");
        let _ = stdout.flush();
    }
}
