//! Record lifecycle events.
//!
//! # Responsibility
//! - Keep per-record-type listener lists for each lifecycle event.
//! - Dispatch synchronously, honoring vetoes on cancellable events.
//! - Suspend dispatch on the calling thread for the duration of a "quiet"
//!   call.
//!
//! # Invariants
//! - Listeners run in registration order, outside the registry lock.
//! - Registrations accumulate; the same callback may be registered twice.
//! - Muting is per thread: a quiet call never silences listeners for other
//!   threads sharing the dispatcher.
//! - A mute guard restores dispatch on every exit path, unwinding included.

use std::any::{Any, TypeId};
use std::cell::RefCell;
use std::collections::HashMap;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use once_cell::sync::Lazy;

/// Lifecycle points a listener can observe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ModelEvent {
    /// Before a full save; cancellable.
    Saving,
    Saved,
    Published,
    /// Before unpublishing; cancellable.
    Unpublishing,
    Unpublished,
}

impl ModelEvent {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Saving => "saving",
            Self::Saved => "saved",
            Self::Published => "published",
            Self::Unpublishing => "unpublishing",
            Self::Unpublished => "unpublished",
        }
    }

    /// Whether a listener returning [`Propagation::Halt`] vetoes the operation.
    pub fn is_cancellable(self) -> bool {
        matches!(self, Self::Saving | Self::Unpublishing)
    }
}

/// Listener verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Propagation {
    Continue,
    /// Veto a cancellable event. Ignored for the others.
    Halt,
}

/// Error raised by a listener; aborts the triggering operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenerError(String);

impl ListenerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }

    pub fn message(&self) -> &str {
        &self.0
    }
}

impl Display for ListenerError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "event listener failed: {}", self.0)
    }
}

impl Error for ListenerError {}

pub type ListenerResult = Result<Propagation, ListenerError>;

/// Shared listener callback for records of type `R`.
pub type Listener<R> = Arc<dyn Fn(&R) -> ListenerResult + Send + Sync>;

type ErasedListener = Arc<dyn Any + Send + Sync>;

static GLOBAL: Lazy<EventDispatcher> = Lazy::new(EventDispatcher::new);
static NEXT_DISPATCHER_ID: AtomicU64 = AtomicU64::new(0);

thread_local! {
    // Mute depth per dispatcher id, for the current thread only.
    static MUTE_DEPTH: RefCell<HashMap<u64, usize>> = RefCell::new(HashMap::new());
}

/// Listener registry keyed by record type and event.
pub struct EventDispatcher {
    id: u64,
    listeners: RwLock<HashMap<(TypeId, ModelEvent), Vec<ErasedListener>>>,
}

impl Default for EventDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self {
            id: NEXT_DISPATCHER_ID.fetch_add(1, Ordering::Relaxed),
            listeners: RwLock::new(HashMap::new()),
        }
    }

    /// Process-wide dispatcher used by repositories built with `try_new`.
    pub fn global() -> &'static EventDispatcher {
        &GLOBAL
    }

    /// Registers `listener` for `event` on records of type `R`.
    pub fn listen<R, F>(&self, event: ModelEvent, listener: F)
    where
        R: 'static,
        F: Fn(&R) -> ListenerResult + Send + Sync + 'static,
    {
        let listener: Listener<R> = Arc::new(listener);
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry((TypeId::of::<R>(), event))
            .or_default()
            .push(Arc::new(listener) as ErasedListener);
    }

    pub fn on_published<R, F>(&self, listener: F)
    where
        R: 'static,
        F: Fn(&R) -> ListenerResult + Send + Sync + 'static,
    {
        self.listen(ModelEvent::Published, listener);
    }

    pub fn on_unpublishing<R, F>(&self, listener: F)
    where
        R: 'static,
        F: Fn(&R) -> ListenerResult + Send + Sync + 'static,
    {
        self.listen(ModelEvent::Unpublishing, listener);
    }

    pub fn on_unpublished<R, F>(&self, listener: F)
    where
        R: 'static,
        F: Fn(&R) -> ListenerResult + Send + Sync + 'static,
    {
        self.listen(ModelEvent::Unpublished, listener);
    }

    pub fn listener_count<R: 'static>(&self, event: ModelEvent) -> usize {
        self.listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&(TypeId::of::<R>(), event))
            .map_or(0, Vec::len)
    }

    /// Drops every listener registered for records of type `R`.
    pub fn forget<R: 'static>(&self) {
        let type_id = TypeId::of::<R>();
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|(listener_type, _), _| *listener_type != type_id);
    }

    /// Fires `event` for `record`.
    ///
    /// Returns `Halt` only when a listener vetoes a cancellable event; the
    /// remaining listeners are skipped in that case. While muted on the
    /// calling thread nothing runs and `Continue` is returned.
    pub fn dispatch<R: 'static>(&self, event: ModelEvent, record: &R) -> ListenerResult {
        if self.is_muted() {
            return Ok(Propagation::Continue);
        }

        let listeners = self
            .listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&(TypeId::of::<R>(), event))
            .cloned()
            .unwrap_or_default();

        for erased in listeners {
            let Some(listener) = erased.downcast_ref::<Listener<R>>() else {
                continue;
            };
            if listener(record)? == Propagation::Halt && event.is_cancellable() {
                return Ok(Propagation::Halt);
            }
        }

        Ok(Propagation::Continue)
    }

    /// Whether dispatch is suspended on the calling thread.
    pub fn is_muted(&self) -> bool {
        MUTE_DEPTH.with(|depths| depths.borrow().get(&self.id).is_some_and(|depth| *depth > 0))
    }

    /// Suspends dispatch on the calling thread until the returned guard
    /// drops. Guards nest.
    pub fn mute(&self) -> MuteGuard<'_> {
        MUTE_DEPTH.with(|depths| *depths.borrow_mut().entry(self.id).or_insert(0) += 1);
        MuteGuard {
            dispatcher: self,
            _thread_bound: PhantomData,
        }
    }

    /// Runs `operation` with dispatch suspended on the calling thread.
    pub fn without_events<T>(&self, operation: impl FnOnce() -> T) -> T {
        let _guard = self.mute();
        operation()
    }
}

/// Restores dispatch on drop. Tied to the thread that created it.
#[must_use = "dispatch resumes as soon as the guard is dropped"]
pub struct MuteGuard<'a> {
    dispatcher: &'a EventDispatcher,
    _thread_bound: PhantomData<*const ()>,
}

impl Drop for MuteGuard<'_> {
    fn drop(&mut self) {
        let id = self.dispatcher.id;
        // The thread-local may already be gone during thread teardown.
        let _ = MUTE_DEPTH.try_with(|depths| {
            let mut depths = depths.borrow_mut();
            if let Some(depth) = depths.get_mut(&id) {
                *depth -= 1;
                if *depth == 0 {
                    depths.remove(&id);
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::{EventDispatcher, ListenerError, ModelEvent, Propagation};
    use std::panic::{catch_unwind, AssertUnwindSafe};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Barrier, Mutex};
    use std::thread;

    struct Draft;
    struct Other;

    #[test]
    fn listeners_run_in_registration_order_and_accumulate() {
        let dispatcher = EventDispatcher::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        for label in ["first", "second", "first"] {
            let seen = Arc::clone(&seen);
            dispatcher.on_published::<Draft, _>(move |_| {
                seen.lock().unwrap().push(label);
                Ok(Propagation::Continue)
            });
        }

        dispatcher.dispatch(ModelEvent::Published, &Draft).unwrap();

        assert_eq!(*seen.lock().unwrap(), ["first", "second", "first"]);
        assert_eq!(dispatcher.listener_count::<Draft>(ModelEvent::Published), 3);
    }

    #[test]
    fn listeners_are_scoped_to_their_record_type() {
        let dispatcher = EventDispatcher::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        dispatcher.on_published::<Other, _>(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Propagation::Continue)
        });

        dispatcher.dispatch(ModelEvent::Published, &Draft).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn halt_vetoes_cancellable_events_and_skips_later_listeners() {
        let dispatcher = EventDispatcher::new();
        let later = Arc::new(AtomicUsize::new(0));
        dispatcher.on_unpublishing::<Draft, _>(|_| Ok(Propagation::Halt));
        let counter = Arc::clone(&later);
        dispatcher.on_unpublishing::<Draft, _>(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Propagation::Continue)
        });

        let outcome = dispatcher.dispatch(ModelEvent::Unpublishing, &Draft).unwrap();
        assert_eq!(outcome, Propagation::Halt);
        assert_eq!(later.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn halt_is_ignored_for_notifications() {
        let dispatcher = EventDispatcher::new();
        let later = Arc::new(AtomicUsize::new(0));
        dispatcher.on_unpublished::<Draft, _>(|_| Ok(Propagation::Halt));
        let counter = Arc::clone(&later);
        dispatcher.on_unpublished::<Draft, _>(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Propagation::Continue)
        });

        let outcome = dispatcher.dispatch(ModelEvent::Unpublished, &Draft).unwrap();
        assert_eq!(outcome, Propagation::Continue);
        assert_eq!(later.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn listener_errors_propagate() {
        let dispatcher = EventDispatcher::new();
        dispatcher.on_published::<Draft, _>(|_| Err(ListenerError::new("boom")));

        let err = dispatcher.dispatch(ModelEvent::Published, &Draft).unwrap_err();
        assert_eq!(err.message(), "boom");
    }

    #[test]
    fn mute_nests_and_recovers_after_panic() {
        let dispatcher = EventDispatcher::new();
        dispatcher.on_unpublishing::<Draft, _>(|_| Ok(Propagation::Halt));

        {
            let _outer = dispatcher.mute();
            dispatcher.without_events(|| assert!(dispatcher.is_muted()));
            assert!(dispatcher.is_muted());
            let outcome = dispatcher.dispatch(ModelEvent::Unpublishing, &Draft).unwrap();
            assert_eq!(outcome, Propagation::Continue);
        }
        assert!(!dispatcher.is_muted());

        let result = catch_unwind(AssertUnwindSafe(|| {
            dispatcher.without_events(|| panic!("listener blew up"));
        }));
        assert!(result.is_err());
        assert!(!dispatcher.is_muted());
    }

    #[test]
    fn quiet_call_on_one_thread_keeps_vetoes_on_another() {
        let dispatcher = EventDispatcher::new();
        dispatcher.on_unpublishing::<Draft, _>(|_| Ok(Propagation::Halt));
        let muted = Barrier::new(2);
        let checked = Barrier::new(2);

        thread::scope(|scope| {
            scope.spawn(|| {
                dispatcher.without_events(|| {
                    assert!(dispatcher.is_muted());
                    muted.wait();
                    checked.wait();
                });
                assert!(!dispatcher.is_muted());
            });

            muted.wait();
            assert!(!dispatcher.is_muted());
            let outcome = dispatcher.dispatch(ModelEvent::Unpublishing, &Draft);
            checked.wait();
            assert_eq!(outcome.unwrap(), Propagation::Halt);
        });
    }

    #[test]
    fn muting_one_dispatcher_leaves_others_active() {
        let first = EventDispatcher::new();
        let second = EventDispatcher::new();
        second.on_unpublishing::<Draft, _>(|_| Ok(Propagation::Halt));

        let _guard = first.mute();
        assert!(first.is_muted());
        assert!(!second.is_muted());
        let outcome = second.dispatch(ModelEvent::Unpublishing, &Draft).unwrap();
        assert_eq!(outcome, Propagation::Halt);
    }

    #[test]
    fn listener_may_register_during_dispatch() {
        let dispatcher = Arc::new(EventDispatcher::new());
        let inner = Arc::clone(&dispatcher);
        dispatcher.on_published::<Draft, _>(move |_| {
            inner.on_published::<Draft, _>(|_| Ok(Propagation::Continue));
            Ok(Propagation::Continue)
        });

        dispatcher.dispatch(ModelEvent::Published, &Draft).unwrap();
        assert_eq!(dispatcher.listener_count::<Draft>(ModelEvent::Published), 2);
    }

    #[test]
    fn forget_clears_only_the_given_type() {
        let dispatcher = EventDispatcher::new();
        dispatcher.on_published::<Draft, _>(|_| Ok(Propagation::Continue));
        dispatcher.on_published::<Other, _>(|_| Ok(Propagation::Continue));

        dispatcher.forget::<Draft>();

        assert_eq!(dispatcher.listener_count::<Draft>(ModelEvent::Published), 0);
        assert_eq!(dispatcher.listener_count::<Other>(ModelEvent::Published), 1);
    }
}
