//! Viewer-side controls whose displayed value is proposed locally but
//! always overwritten by what the server confirms.
//!
//! A control moves `Idle -> Pending(target) -> Idle(confirmed)`. A failed
//! request returns it to `Idle` with the value it had before the click and
//! the error flag raised. While a request is pending further clicks are
//! rejected with [`EngagementError::Busy`], so two requests from the same
//! control never race. A request whose future is dropped before the server
//! replies settles the control through [`InFlight`].

use std::{
    collections::BTreeSet,
    ops::{Deref, DerefMut},
};

use crate::{
    api::VoteOutcome,
    domain::{CatalogKind, Direction, Votable, VoteState, derive_vote_state},
    error::EngagementError,
    id::{IdRef, normalize_ids},
};

pub const DEFAULT_FAVORITES_LIMIT: usize = 4;
pub const LIMIT_REACHED_MESSAGE: &str = "Limit reached: remove one to add another.";
pub const ABANDONED_MESSAGE: &str = "request abandoned before the server replied";

/// Re-clicking the active direction clears the vote.
pub fn net_vote_target(current: VoteState, requested: Direction) -> VoteState {
    let requested = VoteState::from(requested);
    if requested == current {
        VoteState::None
    } else {
        requested
    }
}

pub fn net_toggle_target(current: bool) -> bool {
    !current
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Phase<S> {
    Idle,
    Pending { target: S },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToggleControl<S> {
    value: S,
    phase: Phase<S>,
    error: Option<String>,
}

impl<S: Clone + PartialEq> ToggleControl<S> {
    pub fn new(value: S) -> Self {
        Self {
            value,
            phase: Phase::Idle,
            error: None,
        }
    }

    /// The value to render. Stays at the pre-click value while pending.
    pub fn value(&self) -> &S {
        &self.value
    }

    pub fn phase(&self) -> &Phase<S> {
        &self.phase
    }

    pub fn is_pending(&self) -> bool {
        matches!(self.phase, Phase::Pending { .. })
    }

    pub fn pending_target(&self) -> Option<&S> {
        match &self.phase {
            Phase::Pending { target } => Some(target),
            Phase::Idle => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn begin(&mut self, target: S) -> Result<S, EngagementError> {
        if self.is_pending() {
            return Err(EngagementError::Busy);
        }
        self.error = None;
        self.phase = Phase::Pending {
            target: target.clone(),
        };
        Ok(target)
    }

    pub fn confirm(&mut self, server_value: S) {
        self.value = server_value;
        self.phase = Phase::Idle;
        self.error = None;
    }

    pub fn fail(&mut self, err: &dyn std::fmt::Display) {
        self.phase = Phase::Idle;
        self.error = Some(err.to_string());
    }

    pub fn clear_error(&mut self) {
        self.error = None;
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoteControl {
    control: ToggleControl<VoteState>,
    score: i64,
}

impl VoteControl {
    pub fn new(value: VoteState, score: i64) -> Self {
        Self {
            control: ToggleControl::new(value),
            score,
        }
    }

    pub fn from_entity<V: Votable>(entity: &V, viewer_id: &str) -> Self {
        Self::new(derive_vote_state(entity, viewer_id), entity.score())
    }

    pub fn value(&self) -> VoteState {
        *self.control.value()
    }

    pub fn score(&self) -> i64 {
        self.score
    }

    pub fn control(&self) -> &ToggleControl<VoteState> {
        &self.control
    }

    pub fn click(&mut self, direction: Direction) -> Result<VoteState, EngagementError> {
        let target = net_vote_target(self.value(), direction);
        self.control.begin(target)
    }

    pub fn confirm(&mut self, outcome: VoteOutcome) {
        self.control.confirm(outcome.value);
        self.score = outcome.score;
    }

    pub fn fail(&mut self, err: &dyn std::fmt::Display) {
        self.control.fail(err);
    }
}

/// Follow and save: a single boolean edge from the viewer to a target.
pub type RelationControl = ToggleControl<bool>;

impl ToggleControl<bool> {
    pub fn click(&mut self) -> Result<bool, EngagementError> {
        let target = net_toggle_target(*self.value());
        self.begin(target)
    }
}

/// The viewer's favorites of one catalog kind, capped at `limit` entries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FavoritesControl {
    kind: CatalogKind,
    limit: usize,
    control: ToggleControl<BTreeSet<String>>,
}

impl FavoritesControl {
    pub fn new(kind: CatalogKind, favorites: &[IdRef], limit: usize) -> Self {
        Self {
            kind,
            limit,
            control: ToggleControl::new(normalize_ids(favorites)),
        }
    }

    pub fn kind(&self) -> CatalogKind {
        self.kind
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn ids(&self) -> &BTreeSet<String> {
        self.control.value()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids().contains(id)
    }

    pub fn control(&self) -> &ToggleControl<BTreeSet<String>> {
        &self.control
    }

    /// Starts a toggle of `id`. Returns whether `id` is expected to be a
    /// favorite afterwards. Adding past the limit is refused here, before
    /// anything is sent, and the set stays unchanged.
    pub fn click(&mut self, id: &str) -> Result<bool, EngagementError> {
        if self.control.is_pending() {
            return Err(EngagementError::Busy);
        }
        let mut target = self.ids().clone();
        let adding = !target.remove(id);
        if adding {
            if target.len() >= self.limit {
                let err = EngagementError::LimitReached { limit: self.limit };
                self.control.fail(&LIMIT_REACHED_MESSAGE);
                return Err(err);
            }
            target.insert(id.to_string());
        }
        self.control.begin(target)?;
        Ok(adding)
    }

    pub fn confirm(&mut self, favorites: &[IdRef]) {
        self.control.confirm(normalize_ids(favorites));
    }

    pub fn fail(&mut self, err: &dyn std::fmt::Display) {
        self.control.fail(err);
    }
}

/// A control that can be left mid-request.
pub trait Settle {
    fn is_pending(&self) -> bool;

    /// Returns to `Idle` with the pre-click value and the error flag raised.
    fn abandon(&mut self);
}

impl<S: Clone + PartialEq> Settle for ToggleControl<S> {
    fn is_pending(&self) -> bool {
        ToggleControl::is_pending(self)
    }

    fn abandon(&mut self) {
        self.fail(&ABANDONED_MESSAGE);
    }
}

impl Settle for VoteControl {
    fn is_pending(&self) -> bool {
        self.control.is_pending()
    }

    fn abandon(&mut self) {
        self.fail(&ABANDONED_MESSAGE);
    }
}

impl Settle for FavoritesControl {
    fn is_pending(&self) -> bool {
        self.control.is_pending()
    }

    fn abandon(&mut self) {
        self.fail(&ABANDONED_MESSAGE);
    }
}

/// Holds a control for the length of one request. If it is dropped while
/// the control is still pending (the request future was cancelled), the
/// control is abandoned instead of staying `Busy` forever.
pub struct InFlight<'a, C: Settle> {
    control: &'a mut C,
}

impl<'a, C: Settle> InFlight<'a, C> {
    /// Wrap a control whose click already succeeded.
    pub fn new(control: &'a mut C) -> Self {
        Self { control }
    }
}

impl<C: Settle> Deref for InFlight<'_, C> {
    type Target = C;

    fn deref(&self) -> &C {
        self.control
    }
}

impl<C: Settle> DerefMut for InFlight<'_, C> {
    fn deref_mut(&mut self) -> &mut C {
        self.control
    }
}

impl<C: Settle> Drop for InFlight<'_, C> {
    fn drop(&mut self) {
        if self.control.is_pending() {
            self.control.abandon();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Post;
    use serde_json::json;

    #[test]
    fn reclicking_active_direction_clears() {
        for state in [VoteState::Up, VoteState::Down, VoteState::None] {
            for dir in [Direction::Up, Direction::Down] {
                let target = net_vote_target(state, dir);
                if VoteState::from(dir) == state {
                    assert_eq!(target, VoteState::None);
                } else {
                    assert_eq!(target, VoteState::from(dir));
                }
            }
        }
    }

    #[test]
    fn downvote_from_up_targets_down_and_takes_server_score() {
        let post: Post = serde_json::from_value(json!({
            "_id": "p1",
            "upvotes": ["u1", "u2"],
            "downvotes": ["u3"]
        }))
        .unwrap();
        let mut vote = VoteControl::from_entity(&post, "u1");
        assert_eq!(vote.value(), VoteState::Up);
        assert_eq!(vote.score(), 1);

        assert_eq!(vote.click(Direction::Down).unwrap(), VoteState::Down);
        assert_eq!(vote.value(), VoteState::Up);

        vote.confirm(VoteOutcome {
            value: VoteState::Down,
            score: -1,
        });
        assert_eq!(vote.value(), VoteState::Down);
        assert_eq!(vote.score(), 1 - 2);
    }

    #[test]
    fn confirm_uses_server_value_not_local_target() {
        let mut vote = VoteControl::new(VoteState::None, 3);
        assert_eq!(vote.click(Direction::Up).unwrap(), VoteState::Up);
        vote.confirm(VoteOutcome {
            value: VoteState::None,
            score: 3,
        });
        assert_eq!(vote.value(), VoteState::None);
        assert_eq!(vote.score(), 3);
    }

    #[test]
    fn second_click_while_pending_is_rejected() {
        let mut vote = VoteControl::new(VoteState::None, 0);
        vote.click(Direction::Up).unwrap();
        assert!(matches!(vote.click(Direction::Up), Err(EngagementError::Busy)));
        assert_eq!(vote.control().pending_target(), Some(&VoteState::Up));
    }

    #[test]
    fn failure_restores_previous_value_and_raises_flag() {
        let mut follow = RelationControl::new(false);
        assert!(follow.click().unwrap());
        follow.fail(&"server returned 500: boom");
        assert!(!*follow.value());
        assert!(!follow.is_pending());
        assert_eq!(follow.error(), Some("server returned 500: boom"));

        assert!(follow.click().unwrap());
        assert_eq!(follow.error(), None);
        follow.confirm(true);
        assert!(*follow.value());
    }

    #[test]
    fn fifth_favorite_is_refused_before_sending() {
        let favs: Vec<IdRef> = ["r1", "r2", "r3", "r4"].into_iter().map(IdRef::from).collect();
        let mut control =
            FavoritesControl::new(CatalogKind::Restaurant, &favs, DEFAULT_FAVORITES_LIMIT);

        let err = control.click("r5").unwrap_err();
        assert!(matches!(err, EngagementError::LimitReached { limit: 4 }));
        assert!(err.to_string().contains("Limit reached"));
        assert_eq!(control.ids().len(), 4);
        assert!(!control.control().is_pending());
        assert_eq!(control.control().error(), Some(LIMIT_REACHED_MESSAGE));

        // Removing is always allowed, even at the cap.
        assert!(!control.click("r2").unwrap());
        control.confirm(&["r1", "r3", "r4"].map(IdRef::from));
        assert_eq!(control.ids().len(), 3);
        assert_eq!(control.control().error(), None);
    }

    #[test]
    fn dropped_request_settles_control() {
        let mut vote = VoteControl::new(VoteState::None, 0);
        {
            let mut held = InFlight::new(&mut vote);
            held.click(Direction::Up).unwrap();
            assert!(held.control().is_pending());
        }
        assert!(!vote.control().is_pending());
        assert_eq!(vote.value(), VoteState::None);
        assert_eq!(vote.control().error(), Some(ABANDONED_MESSAGE));
        assert!(vote.click(Direction::Up).is_ok());
    }

    #[test]
    fn settled_request_is_left_alone_on_drop() {
        let mut follow = RelationControl::new(false);
        follow.click().unwrap();
        {
            let mut held = InFlight::new(&mut follow);
            held.confirm(true);
        }
        assert!(*follow.value());
        assert_eq!(follow.error(), None);
    }
}
