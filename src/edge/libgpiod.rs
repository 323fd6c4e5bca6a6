use std::path::PathBuf;
use std::time::Duration;

use libgpiod::{chip::Chip, line, line::EventClock, request};

use crate::edge::{EdgeEvent, EdgeSource};
use crate::error::AppError;

const EVENT_BUFFER_CAPACITY: usize = 64;

/// Falling-edge event source over the gpio character device.
pub struct LibgpiodSource {
    request: request::Request,
    buffer: request::Buffer,
}

impl LibgpiodSource {
    pub fn open(chip_path: &str, lines: &[u32]) -> Result<Self, AppError> {
        let chip = Chip::open(&PathBuf::from(chip_path))
            .map_err(|e| AppError::Config(format!("open chip {chip_path}: {e}")))?;

        let mut settings =
            line::Settings::new().map_err(|e| AppError::Config(format!("line settings: {e}")))?;
        settings
            .set_direction(line::Direction::Input)
            .map_err(|e| AppError::Config(format!("set direction: {e}")))?;
        settings
            .set_edge_detection(Some(line::Edge::Falling))
            .map_err(|e| AppError::Config(format!("set edge detection: {e}")))?;
        settings
            .set_event_clock(EventClock::Realtime)
            .map_err(|e| AppError::Config(format!("set event clock: {e}")))?;

        let mut line_cfg =
            line::Config::new().map_err(|e| AppError::Config(format!("line config: {e}")))?;
        line_cfg
            .add_line_settings(lines, settings)
            .map_err(|e| AppError::Config(format!("line config add settings: {e}")))?;

        let mut req_cfg =
            request::Config::new().map_err(|e| AppError::Config(format!("request config: {e}")))?;
        req_cfg
            .set_consumer(env!("CARGO_PKG_NAME"))
            .map_err(|e| AppError::Config(format!("request consumer: {e}")))?;

        let request = chip
            .request_lines(Some(&req_cfg), &line_cfg)
            .map_err(|e| AppError::Config(format!("request lines: {e}")))?;
        let buffer = request::Buffer::new(EVENT_BUFFER_CAPACITY)
            .map_err(|e| AppError::Config(format!("event buffer: {e}")))?;

        Ok(Self { request, buffer })
    }
}

impl EdgeSource for LibgpiodSource {
    fn wait_edges(&mut self, timeout: Duration) -> Result<Vec<EdgeEvent>, AppError> {
        let has_event = self
            .request
            .wait_edge_events(Some(timeout))
            .map_err(|e| AppError::Transport(format!("wait edge events: {e}")))?;
        if !has_event {
            return Ok(Vec::new());
        }

        let events = self
            .request
            .read_edge_events(&mut self.buffer)
            .map_err(|e| AppError::Transport(format!("read edge events: {e}")))?;

        let mut out = Vec::new();
        for event in events {
            let Ok(event) = event else { continue };
            let Ok(line) = event.line_offset() else {
                continue;
            };
            out.push(EdgeEvent {
                line,
                timestamp_ms: event.timestamp().as_millis() as u64,
            });
        }
        Ok(out)
    }
}
