//! Cycle collection for the possibly-cyclic payloads.
//!
//! Reference counting reclaims everything acyclic. Containers, closures,
//! and Dynamic boxes can form cycles, so tagged payloads of those classes
//! also get an entry on a live list and a mark-sweep pass runs over it
//! whenever tagging would push the live count past the threshold.
//!
//! Sweeping never frees a header directly; it *hollows* the payload
//! (empties its interior), which breaks the cycle and lets the strong
//! counts fall to zero on their own. The `hollow` flag makes repeat visits
//! harmless and lets the late register cleanup recognize dead values.

use std::rc::{Rc, Weak};

use tracing::{debug, trace};

use crate::interpreter::Vm;
use crate::value::{ContainerBody, DynamicBody, FunctionBody, GcState, Value};

/// Weak handle to a tagged payload. A dead handle means the payload was
/// already reclaimed by refcounting; the entry is then just retired.
#[derive(Debug)]
pub(crate) enum GcTarget {
    Container(Weak<ContainerBody>),
    Function(Weak<FunctionBody>),
    Dynamic(Weak<DynamicBody>),
}

/// One live-list entry.
#[derive(Debug)]
pub(crate) struct GcEntry {
    target: GcTarget,
}

impl GcEntry {
    fn state(&self) -> Option<EntryState> {
        match &self.target {
            GcTarget::Container(weak) => weak.upgrade().map(|body| EntryState {
                gc_pass: body.gc.pass.get(),
                hollow: body.gc.hollow.get(),
            }),
            GcTarget::Function(weak) => weak.upgrade().map(|body| EntryState {
                gc_pass: body.gc.pass.get(),
                hollow: body.gc.hollow.get(),
            }),
            GcTarget::Dynamic(weak) => weak.upgrade().map(|body| EntryState {
                gc_pass: body.gc.pass.get(),
                hollow: body.gc.hollow.get(),
            }),
        }
    }

    fn hollow(&self) {
        match &self.target {
            GcTarget::Container(weak) => {
                if let Some(body) = weak.upgrade() {
                    body.gc.hollow.set(true);
                    body.values.borrow_mut().clear();
                }
            }
            GcTarget::Function(weak) => {
                if let Some(body) = weak.upgrade() {
                    body.gc.hollow.set(true);
                    body.upvalues.borrow_mut().take();
                }
            }
            GcTarget::Dynamic(weak) => {
                if let Some(body) = weak.upgrade() {
                    body.gc.hollow.set(true);
                    *body.slot.borrow_mut() = Value::Unit;
                }
            }
        }
    }
}

struct EntryState {
    gc_pass: u32,
    hollow: bool,
}

impl Vm {
    /// Attach a gc entry to `value`, sweeping first if the live list is at
    /// the threshold. Only the cyclic-capable payloads accept a tag;
    /// tagging anything else is a no-op.
    pub fn tag_value(&mut self, value: &Value) {
        let target = match value {
            Value::Container(body) => {
                if body.gc.tagged.get() {
                    return;
                }

                body.gc.tagged.set(true);
                GcTarget::Container(Rc::downgrade(body))
            }
            Value::Function(body) => {
                if body.gc.tagged.get() {
                    return;
                }

                body.gc.tagged.set(true);
                GcTarget::Function(Rc::downgrade(body))
            }
            Value::Dynamic(body) => {
                if body.gc.tagged.get() {
                    return;
                }

                body.gc.tagged.set(true);
                GcTarget::Dynamic(Rc::downgrade(body))
            }
            _ => return,
        };

        if self.gc_live.len() >= self.gc_threshold {
            self.invoke_gc();
        }

        self.gc_live.push(GcEntry { target });
    }

    /// Number of entries currently on the live list.
    pub fn gc_live_count(&self) -> usize {
        self.gc_live.len()
    }

    /// Live entries allowed before the next tag sweeps.
    pub fn gc_threshold(&self) -> usize {
        self.gc_threshold
    }

    /// Run one full collection.
    pub fn invoke_gc(&mut self) {
        self.gc_pass += 1;
        let pass = self.gc_pass;

        trace!(pass, live = self.gc_live.len(), "gc sweep");

        // Stage 1: mark everything reachable from the active window of the
        // register file.
        let total = self.frames[self.frame].top;
        for value in &self.regs[..total] {
            if value.is_sweepable() {
                mark(pass, value);
            }
        }

        // The readonly table can hold prototypes that became closures via
        // dynaload; keep anything it references alive too.
        for value in &self.readonly {
            if value.is_sweepable() {
                mark(pass, value);
            }
        }

        // Stage 2: hollow every live entry the mark didn't reach. Entries
        // whose payload already died by refcount are left for stage 4.
        for entry in &self.gc_live {
            if let Some(state) = entry.state() {
                if state.gc_pass != pass && !state.hollow {
                    entry.hollow();
                }
            }
        }

        // Stage 3: registers past the live window may still hold values
        // the sweep just emptied. Clear them so later frame setup cannot
        // resurrect a hollowed payload.
        for slot in total..self.regs.len() {
            if is_hollow(&self.regs[slot]) {
                self.regs[slot] = Value::Unit;
            }
        }

        // Stage 4: retire entries for dead or hollowed payloads; whatever
        // remains is the new live list.
        self.gc_live.retain(|entry| {
            entry
                .state()
                .is_some_and(|state| state.gc_pass == pass && !state.hollow)
        });

        // If the sweep didn't reclaim below the threshold, grow it instead
        // of sweeping on every tag while everything is alive.
        if self.gc_live.len() >= self.gc_threshold {
            self.gc_threshold *= self.gc_multiplier;
            debug!(threshold = self.gc_threshold, "gc threshold raised");
        }
    }
}

fn is_hollow(value: &Value) -> bool {
    match value {
        Value::Container(body) => body.gc.hollow.get(),
        Value::Function(body) => body.gc.hollow.get(),
        Value::Dynamic(body) => body.gc.hollow.get(),
        _ => false,
    }
}

/// Stamp `gc` with the pass, reporting whether it was already visited.
fn visit(pass: u32, gc: &GcState) -> bool {
    if gc.pass.get() == pass {
        return false;
    }

    gc.pass.set(pass);
    true
}

/// Per-class marker dispatch. Children are only followed when they are
/// themselves sweepable.
pub(crate) fn mark(pass: u32, value: &Value) {
    match value {
        Value::Container(body) => {
            if !visit(pass, &body.gc) {
                return;
            }

            for element in body.values.borrow().iter() {
                if element.is_sweepable() {
                    mark(pass, element);
                }
            }
        }
        Value::Hash(body) => {
            if !visit(pass, &body.gc) {
                return;
            }

            for record in body.map.borrow().values() {
                if record.is_sweepable() {
                    mark(pass, record);
                }
            }
        }
        Value::Dynamic(body) => {
            if !visit(pass, &body.gc) {
                return;
            }

            let inner = body.slot.borrow();
            if inner.is_sweepable() {
                mark(pass, &inner);
            }
        }
        Value::Function(body) => {
            if !visit(pass, &body.gc) {
                return;
            }

            if let Some(cells) = body.upvalues.borrow().as_ref() {
                for cell in cells.iter().flatten() {
                    let inner = cell.borrow();
                    if inner.is_sweepable() {
                        mark(pass, &inner);
                    }
                }
            }
        }
        _ => {}
    }
}
