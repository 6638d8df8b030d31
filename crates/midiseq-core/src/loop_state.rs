//! Loop bookkeeping: the global loop flags and the nested loop stack.

use crate::position::Position;

/// One level of the nested loop stack.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LoopStackEntry {
    pub infinite: bool,
    /// Remaining passes through the loop body.
    pub loops: i32,
    pub start: u64,
    pub end: u64,
    /// Where playback resumes for the next pass.
    pub start_position: Position,
}

impl LoopStackEntry {
    pub fn new(loops: u8, tick: u64) -> Self {
        Self {
            infinite: loops == 0,
            loops: i32::from(loops),
            start: tick,
            end: tick,
            start_position: Position::default(),
        }
    }
}

/// Loop flags raised while dispatching a row and consumed after it.
#[derive(Debug, Clone, Default)]
pub struct LoopState {
    pub caught_start: bool,
    pub caught_end: bool,
    pub caught_stack_start: bool,
    pub caught_stack_end: bool,
    pub caught_stack_break: bool,
    /// The next stack-begin event is a replay and must not reset its level.
    pub skip_stack_start: bool,
    /// Loop markers are malformed (or absent); marker loops are ignored.
    pub invalid: bool,
    /// A seek passed the loop end; the next song end rewinds to the start.
    pub temporary_broken: bool,
    /// Internal 0-based repeat count, -1 for forever.
    pub loops_count: i32,
    pub loops_left: i32,
    pub stack: Vec<LoopStackEntry>,
    /// Current stack index, -1 outside any nested loop.
    pub stack_level: i32,
}

impl LoopState {
    pub fn new() -> Self {
        let mut state = Self::default();
        state.full_reset();
        state
    }

    pub fn reset(&mut self) {
        self.caught_start = false;
        self.caught_end = false;
        self.caught_stack_start = false;
        self.caught_stack_end = false;
        self.caught_stack_break = false;
        self.skip_stack_start = false;
        self.loops_left = self.loops_count;
    }

    pub fn full_reset(&mut self) {
        self.loops_count = -1;
        self.reset();
        self.invalid = false;
        self.temporary_broken = false;
        self.stack.clear();
        self.stack_level = -1;
    }

    /// A stack end was caught on a level that still has passes to run.
    pub fn is_stack_end(&self) -> bool {
        self.caught_stack_end
            && self
                .current_stack()
                .is_some_and(|e| e.infinite || e.loops > 0)
    }

    pub fn stack_up(&mut self) {
        self.stack_level += 1;
    }

    pub fn stack_down(&mut self) {
        self.stack_level -= 1;
    }

    pub fn current_stack(&self) -> Option<&LoopStackEntry> {
        usize::try_from(self.stack_level)
            .ok()
            .and_then(|level| self.stack.get(level))
    }

    /// Entry at the current level; outside the stack this is the first
    /// entry, created on demand.
    pub fn current_stack_mut(&mut self) -> &mut LoopStackEntry {
        let level = usize::try_from(self.stack_level)
            .ok()
            .filter(|&l| l < self.stack.len())
            .unwrap_or(0);
        if self.stack.is_empty() {
            self.stack.push(LoopStackEntry::default());
        }
        &mut self.stack[level]
    }

    /// Entry `level`, growing the stack with fresh entries as needed.
    pub fn stack_entry_mut(&mut self, level: usize) -> &mut LoopStackEntry {
        if level >= self.stack.len() {
            self.stack.resize_with(level + 1, LoopStackEntry::default);
        }
        &mut self.stack[level]
    }
}
