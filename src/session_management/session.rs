use crate::data_capture::types::{CopyReport, Direction};
use crate::session_management::SessionStatus;
use chrono::{DateTime, Utc};
use std::net::SocketAddr;
use uuid::Uuid;

/// Bookkeeping for one forwarded source connection.
#[derive(Debug, Clone)]
pub struct Session {
    pub id: Uuid,
    pub client_addr: SocketAddr,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub bytes_upstream: u64,
    pub bytes_downstream: u64,
    pub upstream_mirror: bool,
    pub downstream_mirror: bool,
    pub status: SessionStatus,
}

impl Session {
    pub fn new(client_addr: SocketAddr) -> Self {
        Self {
            id: Uuid::new_v4(),
            client_addr,
            start_time: Utc::now(),
            end_time: None,
            bytes_upstream: 0,
            bytes_downstream: 0,
            upstream_mirror: false,
            downstream_mirror: false,
            status: SessionStatus::Pending,
        }
    }

    pub fn bytes_transferred(&self) -> u64 {
        self.bytes_upstream + self.bytes_downstream
    }

    pub fn record(&mut self, report: &CopyReport) {
        match report.direction {
            Direction::Upstream => self.bytes_upstream += report.bytes_forwarded,
            Direction::Downstream => self.bytes_downstream += report.bytes_forwarded,
        }
    }

    pub fn finish(&mut self, status: SessionStatus) {
        self.status = status;
        self.end_time = Some(Utc::now());
    }
}
