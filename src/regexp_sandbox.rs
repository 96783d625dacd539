//! The regex sandbox contract (spec §4.5, §1): the matcher itself is a
//! separately-sandboxed collaborator outside the core. This module only
//! defines the trait the core dials through, plus the thread+timeout
//! default implementation, grounded in the teacher's `timer_thread.rs`
//! (a background thread driven over a channel) paired with `regress` for
//! the actual match.

use crate::config::EngineConfig;
use crate::error::EngineError;
use crossbeam_channel::{unbounded, RecvTimeoutError};
use std::time::Duration;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RegexOp {
    Split,
    Match,
    Search,
    Replace,
    Exec,
}

pub struct RegexRequest {
    pub op: RegexOp,
    pub source: String,
    pub flags: String,
    pub subject: String,
    pub last_index: usize,
}

pub struct RegexResponse {
    /// Matched text/groups, serialized to a JSON-ish value the caller turns
    /// into guest objects; `None` is `null` (no match, or timeout).
    pub matched: Option<Vec<Option<String>>>,
    pub new_last_index: usize,
}

pub trait RegexSandbox {
    /// Runs one operation to completion or returns `Err(EngineError::RegexTimeout)`.
    /// Implementations must honor `config.regexp_thread_timeout` and must be
    /// interruptible (spec §4.5): a hung match can never block the host.
    fn run(&self, req: RegexRequest, config: &EngineConfig) -> Result<RegexResponse, EngineError>;
}

/// `REGEXP_MODE = 0`: every regex operation is rejected.
pub struct RejectSandbox;

impl RegexSandbox for RejectSandbox {
    fn run(&self, _req: RegexRequest, _config: &EngineConfig) -> Result<RegexResponse, EngineError> {
        Err(EngineError::RegexDisabled)
    }
}

/// `REGEXP_MODE = 1`: run `regress` directly in-process, no timeout.
pub struct NativeSandbox;

impl RegexSandbox for NativeSandbox {
    fn run(&self, req: RegexRequest, _config: &EngineConfig) -> Result<RegexResponse, EngineError> {
        execute_regress(&req).ok_or_else(|| EngineError::RegexTimeout { pattern: req.source.clone() }).map(|r| r)
    }
}

/// `REGEXP_MODE = 2` (default): delegate to a worker thread with a hard
/// timeout, exactly the shape of the teacher's `timer_thread.rs` — a
/// dedicated thread, commands in over a channel, results out over another,
/// except here we block on `recv_timeout` for a single request/response
/// instead of running a persistent event loop, since each regex op is
/// independent and must be individually interruptible.
pub struct ThreadSandbox;

impl RegexSandbox for ThreadSandbox {
    fn run(&self, req: RegexRequest, config: &EngineConfig) -> Result<RegexResponse, EngineError> {
        let (tx, rx) = unbounded();
        let source = req.source.clone();
        let timeout = config.regexp_thread_timeout;
        let handle = std::thread::Builder::new()
            .name("guest-regex-sandbox".to_string())
            .spawn(move || {
                let result = execute_regress(&req);
                let _ = tx.send(result);
            });
        if handle.is_err() {
            return Err(EngineError::RegexTimeout { pattern: source });
        }
        match rx.recv_timeout(timeout) {
            Ok(Some(resp)) => Ok(resp),
            Ok(None) | Err(RecvTimeoutError::Timeout) => {
                log::warn!("regex sandbox timed out matching /{source}/");
                Err(EngineError::RegexTimeout { pattern: source })
            }
            Err(RecvTimeoutError::Disconnected) => Err(EngineError::RegexTimeout { pattern: source }),
        }
    }
}

fn execute_regress(req: &RegexRequest) -> Option<RegexResponse> {
    let mut opts = regress::Flags::default();
    for c in req.flags.chars() {
        match c {
            'i' => opts.icase = true,
            'm' => opts.multiline = true,
            's' => opts.dot_matches_new_line = true,
            _ => {}
        }
    }
    let re = regress::Regex::with_flags(&req.source, opts).ok()?;
    let start = req.last_index.min(req.subject.len());
    match req.op {
        RegexOp::Exec | RegexOp::Match | RegexOp::Search => {
            let m = re.find_from(&req.subject, start).next()?;
            let mut groups = Vec::new();
            groups.push(Some(req.subject[m.range()].to_string()));
            for g in m.captures.iter() {
                groups.push(g.as_ref().map(|r| req.subject[r.clone()].to_string()));
            }
            Some(RegexResponse {
                matched: Some(groups),
                new_last_index: m.range().end,
            })
        }
        RegexOp::Split | RegexOp::Replace => {
            let m = re.find_from(&req.subject, start).next();
            match m {
                Some(m) => Some(RegexResponse {
                    matched: Some(vec![Some(req.subject[m.range()].to_string())]),
                    new_last_index: m.range().end,
                }),
                None => Some(RegexResponse { matched: None, new_last_index: start }),
            }
        }
    }
}

pub fn default_sandbox(mode: crate::config::RegexpMode) -> Box<dyn RegexSandbox> {
    match mode {
        crate::config::RegexpMode::Reject => Box::new(RejectSandbox),
        crate::config::RegexpMode::Native => Box::new(NativeSandbox),
        crate::config::RegexpMode::Sandboxed => Box::new(ThreadSandbox),
    }
}
