use crate::peer::connection::PeerConnection;
use crate::peer::types::IceCandidate;
use std::collections::VecDeque;

/// Удалённый кандидат вместе с отправителем
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingCandidate {
    pub from_id: String,
    pub candidate: IceCandidate,
}

/// Кандидаты, полученные до установки remote description.
///
/// Только FIFO: порядок прихода сохраняется, очередь опустошается целиком.
#[derive(Debug, Default)]
pub struct CandidateQueue {
    pending: VecDeque<PendingCandidate>,
}

impl CandidateQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, from_id: impl Into<String>, candidate: IceCandidate) {
        self.pending.push_back(PendingCandidate {
            from_id: from_id.into(),
            candidate,
        });
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn clear(&mut self) {
        self.pending.clear();
    }

    pub fn drain(&mut self) -> Vec<PendingCandidate> {
        self.pending.drain(..).collect()
    }
}

/// Результат применения отложенных кандидатов
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FlushReport {
    pub applied: usize,
    pub failed: usize,
    pub foreign: usize,
}

/// Применяет все отложенные кандидаты после установки remote description.
///
/// Кандидаты от других участников отбрасываются. Ошибка одного кандидата не
/// прерывает остальные.
pub async fn apply_pending_candidates(
    pc: &dyn PeerConnection,
    remote_id: &str,
    queue: &mut CandidateQueue,
) -> FlushReport {
    let candidates = queue.drain();
    let mut report = FlushReport::default();
    if candidates.is_empty() {
        return report;
    }

    let mut own = Vec::with_capacity(candidates.len());
    for pending in candidates {
        if pending.from_id != remote_id {
            log::warn!(
                "dropping queued candidate from {} (link is with {remote_id})",
                pending.from_id
            );
            report.foreign += 1;
            continue;
        }
        own.push(pending.candidate);
    }

    analyze_candidates(&own);
    for candidate in own {
        log::debug!("Applying pending candidate: {:?}", candidate.candidate);
        match pc.add_ice_candidate(&candidate).await {
            Ok(()) => report.applied += 1,
            Err(e) => {
                log::warn!("Failed to apply pending candidate: {e}");
                report.failed += 1;
            }
        }
    }
    log::info!(
        "flushed candidate queue: {} applied, {} failed, {} foreign",
        report.applied,
        report.failed,
        report.foreign
    );
    report
}

pub fn analyze_candidates(candidates: &[IceCandidate]) {
    let mut host_count = 0;
    let mut srflx_count = 0;
    let mut relay_count = 0;

    for candidate in candidates {
        if candidate.candidate.contains("typ host") {
            host_count += 1;
        } else if candidate.candidate.contains("typ srflx") {
            srflx_count += 1;
        } else if candidate.candidate.contains("typ relay") {
            relay_count += 1;
        }
    }

    log::info!(
        "Candidate analysis: {} host, {} srflx, {} relay",
        host_count,
        srflx_count,
        relay_count
    );

    if relay_count == 0 {
        log::warn!("No TURN relay candidates found! Connection through NAT may fail.");
    }
}
