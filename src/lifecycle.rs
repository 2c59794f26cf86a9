//! Client-side status machine around a single layout generation request.
//!
//! ```text
//! idle|presenting --submit--> absorbing --delay--> generating --ok--> presenting
//!                                                  generating --err--> idle (+error)
//! any --start over--> idle
//! ```
//!
//! Each submit opens a new cycle and hands out a [`CycleTicket`]. Transitions
//! driven by timers or network callbacks must present the ticket of the
//! current cycle, so callbacks from an abandoned cycle are ignored.

use serde::Serialize;

use crate::{generator::GenerationError, models::LayoutResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum GenerationStatus {
    #[default]
    Idle,
    Absorbing,
    Generating,
    Presenting,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleTicket(u64);

#[derive(Debug, Default)]
pub struct GenerationLifecycle {
    status: GenerationStatus,
    layouts: Vec<LayoutResult>,
    error: Option<String>,
    cycle: u64,
}

impl GenerationLifecycle {
    pub fn status(&self) -> GenerationStatus { self.status }

    pub fn layouts(&self) -> &[LayoutResult] { &self.layouts }

    pub fn error(&self) -> Option<&str> { self.error.as_deref() }

    pub fn is_in_flight(&self) -> bool {
        matches!(self.status, GenerationStatus::Absorbing | GenerationStatus::Generating)
    }

    fn is_current(&self, ticket: CycleTicket) -> bool { ticket.0 == self.cycle }

    /// Opens a new cycle. Returns `None` when the inputs are incomplete or a
    /// cycle is already in flight.
    pub fn submit(&mut self, inputs_ready: bool) -> Option<CycleTicket> {
        if !inputs_ready || self.is_in_flight() {
            return None;
        }
        self.cycle += 1;
        self.layouts.clear();
        self.error = None;
        self.status = GenerationStatus::Absorbing;
        Some(CycleTicket(self.cycle))
    }

    /// The cosmetic delay elapsed; returns whether the request should go out.
    pub fn begin_request(&mut self, ticket: CycleTicket) -> bool {
        if !self.is_current(ticket) || self.status != GenerationStatus::Absorbing {
            return false;
        }
        self.status = GenerationStatus::Generating;
        true
    }

    /// Applies the outcome of the request. Returns `false` if it was stale.
    pub fn resolve(&mut self, ticket: CycleTicket, outcome: Result<Vec<LayoutResult>, GenerationError>) -> bool {
        if !self.is_current(ticket) || self.status != GenerationStatus::Generating {
            return false;
        }
        match outcome {
            Ok(layouts) => {
                self.layouts = rank_layouts(layouts);
                self.status = GenerationStatus::Presenting;
            }
            Err(e) => {
                self.layouts.clear();
                self.error = Some(format!("Failed to generate layouts: {e}"));
                self.status = GenerationStatus::Idle;
            }
        }
        true
    }

    pub fn start_over(&mut self) {
        self.cycle += 1;
        self.layouts.clear();
        self.error = None;
        self.status = GenerationStatus::Idle;
    }

    pub fn dismiss_error(&mut self) {
        if !self.is_in_flight() {
            self.error = None;
        }
    }
}

/// Highest score first. `sort_by` is stable, so equal scores keep their
/// response order.
pub fn rank_layouts(mut layouts: Vec<LayoutResult>) -> Vec<LayoutResult> {
    layouts.sort_by(|a, b| b.score.total_cmp(&a.score));
    layouts
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn layout(cta: &str, score: f64) -> LayoutResult {
        LayoutResult { image: String::new(), score, palette: vec![], cta_text: cta.to_string() }
    }

    fn ctas(layouts: &[LayoutResult]) -> Vec<&str> { layouts.iter().map(|l| l.cta_text.as_str()).collect() }

    #[test]
    fn happy_path_walks_every_state() {
        let mut lc = GenerationLifecycle::default();
        assert_eq!(lc.status(), GenerationStatus::Idle);

        let ticket = lc.submit(true).unwrap();
        assert_eq!(lc.status(), GenerationStatus::Absorbing);
        assert!(lc.begin_request(ticket));
        assert_eq!(lc.status(), GenerationStatus::Generating);

        assert!(lc.resolve(ticket, Ok(vec![layout("a", 0.2), layout("b", 0.9), layout("c", 0.5)])));
        assert_eq!(lc.status(), GenerationStatus::Presenting);
        assert_eq!(ctas(lc.layouts()), vec!["b", "c", "a"]);
    }

    #[test]
    fn incomplete_inputs_never_leave_idle() {
        let mut lc = GenerationLifecycle::default();
        assert!(lc.submit(false).is_none());
        assert_eq!(lc.status(), GenerationStatus::Idle);
    }

    #[test]
    fn second_submit_while_in_flight_is_refused() {
        let mut lc = GenerationLifecycle::default();
        let ticket = lc.submit(true).unwrap();
        assert!(lc.submit(true).is_none());
        lc.begin_request(ticket);
        assert!(lc.submit(true).is_none());
    }

    #[test]
    fn failure_returns_to_idle_with_message() {
        let mut lc = GenerationLifecycle::default();
        let ticket = lc.submit(true).unwrap();
        lc.begin_request(ticket);
        lc.resolve(ticket, Err(GenerationError::Status { status: 500, body: "boom".into() }));

        assert_eq!(lc.status(), GenerationStatus::Idle);
        assert!(lc.layouts().is_empty());
        assert_eq!(lc.error(), Some("Failed to generate layouts: Network error: 500"));
    }

    #[test]
    fn new_submit_from_presenting_clears_previous_results() {
        let mut lc = GenerationLifecycle::default();
        let first = lc.submit(true).unwrap();
        lc.begin_request(first);
        lc.resolve(first, Ok(vec![layout("a", 0.8)]));

        let second = lc.submit(true).unwrap();
        assert_ne!(first, second);
        assert!(lc.layouts().is_empty());
        assert_eq!(lc.status(), GenerationStatus::Absorbing);
    }

    #[test]
    fn start_over_invalidates_the_running_cycle() {
        let mut lc = GenerationLifecycle::default();
        let ticket = lc.submit(true).unwrap();
        lc.begin_request(ticket);
        lc.start_over();

        assert!(!lc.resolve(ticket, Ok(vec![layout("late", 0.99)])));
        assert_eq!(lc.status(), GenerationStatus::Idle);
        assert!(lc.layouts().is_empty());
        assert!(lc.error().is_none());
    }

    #[test]
    fn stale_delay_does_not_start_a_request() {
        let mut lc = GenerationLifecycle::default();
        let ticket = lc.submit(true).unwrap();
        lc.start_over();
        assert!(!lc.begin_request(ticket));
        assert_eq!(lc.status(), GenerationStatus::Idle);
    }

    #[test]
    fn dismissing_the_error_keeps_state() {
        let mut lc = GenerationLifecycle::default();
        let ticket = lc.submit(true).unwrap();
        lc.begin_request(ticket);
        lc.resolve(ticket, Err(GenerationError::Transport("connection refused".into())));
        lc.dismiss_error();
        assert!(lc.error().is_none());
        assert_eq!(lc.status(), GenerationStatus::Idle);
    }

    #[test]
    fn equal_scores_keep_response_order() {
        let input = vec![layout("x", 0.5), layout("y", 0.7), layout("z", 0.5), layout("w", 0.5)];
        let first = rank_layouts(input.clone());
        let second = rank_layouts(input);
        assert_eq!(ctas(&first), vec!["y", "x", "z", "w"]);
        assert_eq!(first, second);
    }
}
