/*
 * Copyright (c) 2024. Govcraft
 *
 * Licensed under either of
 *   * Apache License, Version 2.0 (the "License");
 *     you may not use this file except in compliance with the License.
 *     You may obtain a copy of the License at http://www.apache.org/licenses/LICENSE-2.0
 *   * MIT license: http://opensource.org/licenses/MIT
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the applicable License for the specific language governing permissions and
 * limitations under that License.
 */

use std::fmt;
use std::ops::Deref;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use tracing::debug;

use crate::common::{now_millis, TimestampMs};
use crate::traits::Interpreter;

/// A loaded interpreter instance whose `dispose` runs when the last holder drops it.
pub struct LiveInterpreter {
    inner: Box<dyn Interpreter>,
    disposed: AtomicBool,
}

/// Shared handle on a live interpreter.
///
/// Holding a lease keeps the instance alive across a swap; the retired
/// instance is disposed once the slot and every lease have been dropped.
pub type InterpreterLease = Arc<LiveInterpreter>;

impl LiveInterpreter {
    pub(crate) fn new(inner: Box<dyn Interpreter>) -> Self {
        Self {
            inner,
            disposed: AtomicBool::new(false),
        }
    }
}

impl Deref for LiveInterpreter {
    type Target = dyn Interpreter;

    fn deref(&self) -> &Self::Target {
        &*self.inner
    }
}

impl fmt::Debug for LiveInterpreter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LiveInterpreter")
            .field("name", &self.inner.name())
            .field("version", &self.inner.version())
            .finish()
    }
}

impl Drop for LiveInterpreter {
    fn drop(&mut self) {
        if !self.disposed.swap(true, Ordering::AcqRel) {
            debug!(name = self.inner.name(), version = self.inner.version(), "Disposing interpreter");
            self.inner.dispose();
        }
    }
}

/// The contents of one interpreter slot.
#[derive(Debug)]
pub struct InterpreterContainer {
    name: String,
    version: String,
    loaded_at: TimestampMs,
    active: AtomicBool,
    instance: InterpreterLease,
}

impl InterpreterContainer {
    pub(crate) fn new(name: impl Into<String>, instance: Box<dyn Interpreter>) -> Self {
        Self {
            name: name.into(),
            version: instance.version().to_string(),
            loaded_at: now_millis(),
            active: AtomicBool::new(true),
            instance: Arc::new(LiveInterpreter::new(instance)),
        }
    }

    /// Slot name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Version tag reported by the instance.
    #[must_use]
    pub fn version(&self) -> &str {
        &self.version
    }

    /// When this container was installed.
    #[must_use]
    pub const fn loaded_at(&self) -> TimestampMs {
        self.loaded_at
    }

    /// `false` once a swap has replaced this container.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    pub(crate) fn deactivate(&self) {
        self.active.store(false, Ordering::Release);
    }

    /// A new lease on the instance.
    #[must_use]
    pub fn lease(&self) -> InterpreterLease {
        Arc::clone(&self.instance)
    }

    pub(crate) fn downgrade(&self) -> Weak<LiveInterpreter> {
        Arc::downgrade(&self.instance)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;
    use crate::common::{RuntimeResult, Value};
    use crate::interpreter::{CompiledScript, ScriptContext};

    struct Counting(Arc<AtomicUsize>);

    impl Interpreter for Counting {
        fn name(&self) -> &str {
            "counting"
        }

        fn version(&self) -> &str {
            "0"
        }

        fn execute(&self, _: &CompiledScript, _: &mut ScriptContext) -> RuntimeResult<Value> {
            Ok(Value::Null)
        }

        fn dispose(&self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_dispose_after_last_lease() {
        let disposed = Arc::new(AtomicUsize::new(0));
        let container = InterpreterContainer::new("counting", Box::new(Counting(Arc::clone(&disposed))));
        let lease = container.lease();
        assert_eq!(container.name(), "counting");

        drop(container);
        assert_eq!(disposed.load(Ordering::SeqCst), 0);
        assert_eq!(lease.version(), "0");

        drop(lease);
        assert_eq!(disposed.load(Ordering::SeqCst), 1);
    }
}
