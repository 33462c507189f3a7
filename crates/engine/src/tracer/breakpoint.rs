// EDB - Ethereum Debugger
// Copyright (C) 2024 Zhuo Zhang and Wuqi Zhang
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

use std::{collections::BTreeSet, sync::Arc};

use sdb_common::{Breakpoint, BreakpointHit};
use tracing::debug;

use crate::SourceMapping;

/// What the breakpoint tracer is waiting for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StepMode {
    /// Stop at registered breakpoints only
    #[default]
    Running,
    /// Stop at the next line
    StepInto,
    /// Stop at the next line at this call depth or shallower
    StepOver {
        /// Depth when the step began
        depth: usize,
    },
    /// Stop at the next line in a caller
    StepOut {
        /// Depth when the step began
        depth: usize,
    },
}

/// Decides, per traced instruction, whether execution should pause.
///
/// Only line changes are considered: consecutive instructions mapped to
/// the same line of the same file never hit twice.
#[derive(Debug, Clone, Default)]
pub struct BreakpointTracer {
    breakpoints: BTreeSet<Breakpoint>,
    mode: StepMode,
    previous: Option<(Arc<str>, usize)>,
}

impl BreakpointTracer {
    /// Creates a tracer without breakpoints.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registered breakpoints, ordered by source and line.
    pub fn breakpoints(&self) -> impl Iterator<Item = &Breakpoint> {
        self.breakpoints.iter()
    }

    /// Registers a breakpoint. Returns `false` if it was already set.
    pub fn add(&mut self, breakpoint: Breakpoint) -> bool {
        self.breakpoints.insert(breakpoint)
    }

    /// Removes a breakpoint. Returns `false` if it was not set.
    pub fn remove(&mut self, breakpoint: &Breakpoint) -> bool {
        self.breakpoints.remove(breakpoint)
    }

    /// Replaces the breakpoints of one source with `lines`.
    pub fn replace(&mut self, source: &str, lines: impl IntoIterator<Item = usize>) {
        self.breakpoints.retain(|bp| bp.source != source);
        self.breakpoints.extend(lines.into_iter().map(|line| Breakpoint::new(source, line)));
    }

    /// Removes every breakpoint.
    pub fn clear(&mut self) {
        self.breakpoints.clear();
    }

    /// Current mode.
    pub fn mode(&self) -> StepMode {
        self.mode
    }

    /// Sets the mode for the next hit.
    pub fn set_mode(&mut self, mode: StepMode) {
        self.mode = mode;
    }

    /// Forgets the last seen line and returns to [`StepMode::Running`].
    /// Breakpoints are kept.
    pub fn reset(&mut self) {
        self.mode = StepMode::Running;
        self.previous = None;
    }

    /// Evaluates one mapped instruction at call-stack `depth`.
    ///
    /// The last seen line is updated on every line change, hit or not, so an
    /// instruction on the same line as the one before never hits. A loop that
    /// leaves a breakpoint line and comes back hits it again.
    pub fn check(&mut self, mapping: &SourceMapping, depth: usize) -> Option<BreakpointHit> {
        let span = mapping.span.as_ref()?;
        let line = span.start.line;

        let same_line = self
            .previous
            .as_ref()
            .is_some_and(|(path, previous)| *path == span.path && *previous == line);
        if same_line {
            return None;
        }
        self.previous = Some((span.path.clone(), line));

        let hit = match self.mode {
            StepMode::Running => self.breakpoints.iter().any(|bp| bp.matches(&span.path, line)),
            StepMode::StepInto => true,
            StepMode::StepOver { depth: start } => depth <= start,
            StepMode::StepOut { depth: start } => depth < start,
        };
        if !hit {
            return None;
        }

        debug!(source = %span.path, line, depth, mode = ?self.mode, "breakpoint hit");
        self.mode = StepMode::Running;
        Some(BreakpointHit { line, source: span.path.to_string() })
    }
}
