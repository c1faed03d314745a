use crate::domain::models::{MessageSeverity, SweepEvent, SweepState, SweepStatus};
use tokio::sync::mpsc;

/// Progress read back from the event stream
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Progress {
    pub completed: usize,
    pub total: usize,
    pub failed: usize,
}

/// Renders sweep progress on stdout as events arrive. Diagnostics go
/// through `tracing` on stderr; this is the user-facing view.
pub struct ConsolePresenter {
    events: mpsc::UnboundedReceiver<SweepEvent>,
    progress: Progress,
}

impl ConsolePresenter {
    pub fn new(events: mpsc::UnboundedReceiver<SweepEvent>) -> Self {
        Self {
            events,
            progress: Progress::default(),
        }
    }

    /// Drain events until the sender side is dropped
    pub async fn run(mut self) -> Progress {
        while let Some(event) = self.events.recv().await {
            if let Some(line) = self.render(event) {
                println!("{}", line);
            }
        }
        self.progress
    }

    fn render(&mut self, event: SweepEvent) -> Option<String> {
        match event {
            SweepEvent::StateChanged(state) => match state {
                SweepState::Idle => None,
                SweepState::Running => {
                    self.progress = Progress::default();
                    Some("Sweep running".to_string())
                }
                SweepState::Ready(SweepStatus::Completed) => Some("Ready".to_string()),
                SweepState::Ready(SweepStatus::Cancelled) => Some("Ready (cancelled)".to_string()),
                SweepState::Ready(SweepStatus::Failed) => Some("Ready (failed)".to_string()),
            },
            SweepEvent::CellCompleted {
                index,
                total,
                cell,
                ok,
            } => {
                self.progress.completed = index + 1;
                self.progress.total = total;
                if !ok {
                    self.progress.failed += 1;
                }
                Some(format!(
                    "[{:>3}/{}] gain={:<3} shutter={:<5} {}",
                    index + 1,
                    total,
                    cell.gain,
                    cell.shutter,
                    if ok { "ok" } else { "FAILED" }
                ))
            }
            SweepEvent::Log(message) => {
                let tag = match message.severity {
                    MessageSeverity::Info => "info",
                    MessageSeverity::Success => "done",
                    MessageSeverity::Warning => "warn",
                    MessageSeverity::Error => "error",
                };
                Some(format!("{}: {}", tag, message.message))
            }
            SweepEvent::MosaicReady {
                width,
                height,
                bytes,
            } => Some(format!(
                "Mosaic ready: {}x{} ({} bytes)",
                width,
                height,
                bytes.len()
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{GridCell, StatusMessage};

    #[tokio::test]
    async fn test_tracks_progress() {
        let (tx, rx) = mpsc::unbounded_channel();
        let presenter = ConsolePresenter::new(rx);
        let cell = GridCell {
            row: 0,
            col: 0,
            gain: 0,
            shutter: 4,
        };

        tx.send(SweepEvent::StateChanged(SweepState::Running)).unwrap();
        for (index, ok) in [(0, true), (1, false), (2, true)] {
            tx.send(SweepEvent::CellCompleted {
                index,
                total: 4,
                cell,
                ok,
            })
            .unwrap();
        }
        drop(tx);

        let progress = presenter.run().await;
        assert_eq!(
            progress,
            Progress {
                completed: 3,
                total: 4,
                failed: 1
            }
        );
    }

    #[test]
    fn test_renders_failed_cell_and_log() {
        let (_tx, rx) = mpsc::unbounded_channel();
        let mut presenter = ConsolePresenter::new(rx);

        let line = presenter
            .render(SweepEvent::CellCompleted {
                index: 4,
                total: 9,
                cell: GridCell {
                    row: 1,
                    col: 1,
                    gain: 124,
                    shutter: 256,
                },
                ok: false,
            })
            .unwrap();
        assert!(line.starts_with("[  5/9]"));
        assert!(line.ends_with("FAILED"));

        let line = presenter
            .render(SweepEvent::Log(StatusMessage {
                message: "Sweep cancelled".to_string(),
                severity: MessageSeverity::Warning,
            }))
            .unwrap();
        assert_eq!(line, "warn: Sweep cancelled");
        assert!(presenter.render(SweepEvent::StateChanged(SweepState::Idle)).is_none());
    }
}
