//! PTY spawning and feeding. Each pane gets one blocking reader thread
//! (the teacher's own pattern: `try_clone_reader()` plus a
//! `std::thread::spawn` loop) that feeds bytes straight into the pane's
//! emulator and then signals the shared [`NotifyPipe`] once per read, so
//! every client send loop wakes from a single fd regardless of which pane
//! changed (§4.2/§4.3).

use std::io::{Read, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};

use portable_pty::{native_pty_system, Child, CommandBuilder, MasterPty, PtySize};

use tokio::sync::mpsc::UnboundedSender;

use crate::notify_pipe::NotifyPipe;
use crate::pane::{Pane, PaneEvent};

/// Login shell, with a modern-terminal environment so the emulator gets
/// the escape sequences it expects.
fn shell_command(cwd: Option<&Path>) -> CommandBuilder {
    let mut c = CommandBuilder::new("bash");
    c.arg("-l");
    c.env("TERM", "xterm-256color");
    c.env("COLORTERM", "truecolor");
    if let Some(dir) = cwd {
        c.cwd(dir);
    }
    c
}

/// Write/resize/kill handle for one pane's PTY. Reading happens on the
/// background thread started by [`spawn_pty`].
pub struct PtyIo {
    writer: Mutex<Box<dyn Write + Send>>,
    master: Mutex<Box<dyn MasterPty + Send>>,
    child: Mutex<Box<dyn Child + Send + Sync>>,
}

impl PtyIo {
    pub fn write_input(&self, bytes: &[u8]) -> std::io::Result<()> {
        self.writer.lock().unwrap().write_all(bytes)
    }

    pub fn resize(&self, rows: u16, cols: u16) -> std::io::Result<()> {
        self.master
            .lock()
            .unwrap()
            .resize(PtySize {
                rows,
                cols,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(to_io_err)
    }

    pub fn kill(&self) -> std::io::Result<()> {
        self.child.lock().unwrap().kill()
    }
}

fn to_io_err(e: anyhow::Error) -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::Other, e.to_string())
}

/// Spawn a shell in a new PTY and start the background reader thread that
/// feeds its output into `pane`. Terminates `pane` and exits the thread on
/// EOF or a read error.
pub fn spawn_pty(
    pane: Arc<Pane>,
    rows: u16,
    cols: u16,
    cwd: Option<&Path>,
    notify: Arc<NotifyPipe>,
    events: UnboundedSender<PaneEvent>,
) -> std::io::Result<PtyIo> {
    let pty_system = native_pty_system();
    let pair = pty_system
        .openpty(PtySize {
            rows,
            cols,
            pixel_width: 0,
            pixel_height: 0,
        })
        .map_err(to_io_err)?;

    let cmd = shell_command(cwd);
    let child = pair.slave.spawn_command(cmd).map_err(to_io_err)?;
    let mut reader = pair.master.try_clone_reader().map_err(to_io_err)?;
    let writer = pair.master.take_writer().map_err(to_io_err)?;

    std::thread::spawn(move || {
        let mut buf = [0u8; 64 * 1024];
        loop {
            match reader.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => {
                    let outcome = match pane.feed(&buf[..n]) {
                        Ok(outcome) => outcome,
                        Err(_) => break,
                    };
                    if let Some(title) = outcome.title_changed {
                        let _ = events.send(PaneEvent::TitleChanged { pane_id: pane.id, title });
                    }
                    if outcome.bell {
                        let _ = events.send(PaneEvent::Bell { pane_id: pane.id });
                    }
                    notify.signal();
                }
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(_) => break,
            }
        }
        pane.mark_terminated();
        notify.signal();
    });

    Ok(PtyIo {
        writer: Mutex::new(writer),
        master: Mutex::new(pair.master),
        child: Mutex::new(child),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn spawned_shell_output_reaches_the_pane() {
        let pane = Arc::new(Pane::new(1, 24, 80, 100));
        let notify = Arc::new(NotifyPipe::new().unwrap());
        let (events, _rx) = tokio::sync::mpsc::unbounded_channel();
        let io = spawn_pty(pane.clone(), 24, 80, None, notify, events).expect("spawn bash");
        io.write_input(b"echo hi\n").unwrap();
        let before = pane.generation();
        std::thread::sleep(Duration::from_millis(500));
        assert!(pane.generation() > before);
        let _ = io.kill();
    }

    #[test]
    fn killed_pty_eventually_terminates_the_pane() {
        let pane = Arc::new(Pane::new(1, 24, 80, 100));
        let notify = Arc::new(NotifyPipe::new().unwrap());
        let (events, _rx) = tokio::sync::mpsc::unbounded_channel();
        let io = spawn_pty(pane.clone(), 24, 80, None, notify, events).expect("spawn bash");
        io.write_input(b"exit\n").unwrap();
        std::thread::sleep(Duration::from_millis(800));
        assert!(!pane.is_alive());
    }
}
