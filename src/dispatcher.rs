//! C5 — action dispatcher (spec §4.5, §9).
//!
//! Sub-sequence dispatch uses an explicit loop over an index, not recursive
//! calls back into the dispatcher, so depth stays bounded regardless of how
//! many actions a sequence carries (spec §9 "explicit stack rather than
//! host-language recursion").

use crate::error::Result;
use crate::identification::FlavourSet;
use crate::state::ProcessingState;
use crate::window::{LineCursor, LineHandle};

/// What happens to an action after it runs, and what happens next in the
/// sequence (spec §4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutcomeKind {
    Continue,
    Stop,
    RemoveAndContinue,
    RemoveAndStop,
}

/// The result of applying one [`Action`]: a kind, an optional
/// self-replacement, and the composable "skip the sub-sequence" flag.
pub struct Outcome {
    pub kind: OutcomeKind,
    pub replacement: Option<Box<dyn Action>>,
    pub skip_sub_sequence: bool,
}

impl Outcome {
    pub fn continue_() -> Self {
        Outcome::of(OutcomeKind::Continue)
    }

    pub fn stop() -> Self {
        Outcome::of(OutcomeKind::Stop)
    }

    pub fn remove_and_continue() -> Self {
        Outcome::of(OutcomeKind::RemoveAndContinue)
    }

    pub fn remove_and_stop() -> Self {
        Outcome::of(OutcomeKind::RemoveAndStop)
    }

    fn of(kind: OutcomeKind) -> Self {
        Outcome {
            kind,
            replacement: None,
            skip_sub_sequence: false,
        }
    }

    #[must_use]
    pub fn replaced_by(mut self, action: Box<dyn Action>) -> Self {
        self.replacement = Some(action);
        self
    }

    #[must_use]
    pub fn skipping_sub_sequence(mut self) -> Self {
        self.skip_sub_sequence = true;
        self
    }

    fn removes_item(&self) -> bool {
        matches!(
            self.kind,
            OutcomeKind::RemoveAndContinue | OutcomeKind::RemoveAndStop
        )
    }

    fn stops_sequence(&self) -> bool {
        matches!(self.kind, OutcomeKind::Stop | OutcomeKind::RemoveAndStop)
    }
}

/// A declarative gate on when an action may run at all (spec §4.5): the
/// generator flavour it applies to, and an optional semver range on the
/// generator version.
pub struct ActionFilter {
    pub flavours: FlavourSet,
    pub version_req: Option<semver::VersionReq>,
}

impl ActionFilter {
    pub fn flavours(flavours: FlavourSet) -> Self {
        ActionFilter {
            flavours,
            version_req: None,
        }
    }

    fn matches(&self, state: &ProcessingState) -> bool {
        let Some(ident) = state.identification.as_ref() else {
            return false;
        };
        let Some(flavour) = ident.flavour else {
            return false;
        };
        if !self.flavours.contains(flavour) {
            return false;
        }
        match (&self.version_req, &ident.generator_version) {
            (Some(req), Some(version)) => req.matches(version),
            (Some(_), None) => false,
            (None, _) => true,
        }
    }
}

/// One step of the per-line pipeline (spec §4.5).
pub trait Action {
    fn apply(
        &mut self,
        cursor: &mut dyn LineCursor,
        handle: LineHandle,
        state: &mut ProcessingState,
    ) -> Result<Outcome>;

    /// `None` means the action always runs. `Some(filter)` means the action
    /// must not run until identification is known, and is permanently
    /// dropped the first time identification is known but the filter does
    /// not match (spec §4.5 "cost is paid once per file").
    fn filter(&self) -> Option<&ActionFilter> {
        None
    }
}

/// Marker action substituted in place of a flavour-filtered action once it
/// is known not to apply; its only job is to remove itself on first touch.
struct NoOpAction;

impl Action for NoOpAction {
    fn apply(
        &mut self,
        _cursor: &mut dyn LineCursor,
        _handle: LineHandle,
        _state: &mut ProcessingState,
    ) -> Result<Outcome> {
        Ok(Outcome::remove_and_continue())
    }
}

/// A `(entry_action, [inner actions...])` pair (spec §4.5).
pub struct SubSequence {
    pub entry: Box<dyn Action>,
    pub inner: Vec<Box<dyn Action>>,
}

/// One item of a [`Sequence`]: a plain action, or a gated sub-sequence.
pub enum SequenceItem {
    Action(Box<dyn Action>),
    SubSequence(SubSequence),
}

impl SequenceItem {
    fn filter(&self) -> Option<&ActionFilter> {
        match self {
            SequenceItem::Action(a) => a.filter(),
            SequenceItem::SubSequence(sub) => sub.entry.filter(),
        }
    }

    fn replace_with_noop(&mut self) {
        match self {
            SequenceItem::Action(a) => *a = Box::new(NoOpAction),
            SequenceItem::SubSequence(sub) => sub.entry = Box::new(NoOpAction),
        }
    }

    fn apply(
        &mut self,
        cursor: &mut dyn LineCursor,
        handle: LineHandle,
        state: &mut ProcessingState,
    ) -> Result<Outcome> {
        match self {
            SequenceItem::Action(a) => a.apply(cursor, handle, state),
            SequenceItem::SubSequence(sub) => sub.entry.apply(cursor, handle, state),
        }
    }

    fn apply_replacement(&mut self, replacement: Box<dyn Action>) {
        match self {
            SequenceItem::Action(a) => *a = replacement,
            SequenceItem::SubSequence(sub) => sub.entry = replacement,
        }
    }
}

/// The ordered list of actions run once per line (spec §4.5, §4.7).
#[derive(Default)]
pub struct Sequence {
    items: Vec<SequenceItem>,
}

impl Sequence {
    pub fn new(items: Vec<SequenceItem>) -> Self {
        Sequence { items }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Runs the full sequence against one line. Returns once every item has
    /// had its turn or an item's outcome stops the sequence early.
    pub fn dispatch(
        &mut self,
        cursor: &mut dyn LineCursor,
        handle: LineHandle,
        state: &mut ProcessingState,
    ) -> Result<()> {
        state.reset_per_line_scratch();
        let mut idx = 0;
        while idx < self.items.len() {
            if let Some(filter) = self.items[idx].filter() {
                if state.identification.is_none() {
                    // Not yet known: this item must not be invoked this line.
                    idx += 1;
                    continue;
                }
                if !filter.matches(state) {
                    self.items[idx].replace_with_noop();
                }
            }

            let outcome = self.items[idx].apply(cursor, handle, state)?;

            if let SequenceItem::SubSequence(sub) = &mut self.items[idx] {
                if !outcome.skip_sub_sequence {
                    dispatch_inner(&mut sub.inner, cursor, handle, state)?;
                }
            }

            let remove = outcome.removes_item();
            let stop = outcome.stops_sequence();

            if let Some(replacement) = outcome.replacement {
                self.items[idx].apply_replacement(replacement);
            }

            if remove {
                self.items.remove(idx);
            } else {
                idx += 1;
            }

            if stop {
                break;
            }
        }
        Ok(())
    }
}

/// Runs a flat list of actions (a sub-sequence's inner actions) using the
/// same explicit-index loop as the outer sequence.
fn dispatch_inner(
    actions: &mut Vec<Box<dyn Action>>,
    cursor: &mut dyn LineCursor,
    handle: LineHandle,
    state: &mut ProcessingState,
) -> Result<()> {
    let mut idx = 0;
    while idx < actions.len() {
        let outcome = actions[idx].apply(cursor, handle, state)?;

        let remove = outcome.removes_item();
        let stop = outcome.stops_sequence();

        if let Some(replacement) = outcome.replacement {
            actions[idx] = replacement;
        }

        if remove {
            actions.remove(idx);
        } else {
            idx += 1;
        }

        if stop {
            break;
        }
    }
    Ok(())
}
