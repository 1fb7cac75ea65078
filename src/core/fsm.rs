//! # Container state machine.
//!
//! ```text
//! Initialize: Uninitialized | Error  ─► Initializing ─► Initialized | Error
//! Start:      Initialized            ─► Starting     ─► Started     | Error
//! Stop:       Started | Error        ─► Stopping     ─► Stopped     | Error
//! ```
//!
//! Every transition runs its body while holding one mutex, so `init`, `serve`
//! and `stop` never overlap. The "-ing" state is published before the body
//! runs and the terminal state after it.

use std::future::Future;

use tokio::sync::{Mutex, MutexGuard};

use crate::error::{ContainerError, Op, StateError};
use crate::events::{Bus, Event, EventKind};
use crate::state::{AtomicState, State};

/// Top-level container events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Transition {
    Initialize,
    Start,
    Stop,
}

impl Transition {
    fn name(&self) -> &'static str {
        match self {
            Transition::Initialize => "initialize",
            Transition::Start => "start",
            Transition::Stop => "stop",
        }
    }

    fn op(&self) -> Op {
        match self {
            Transition::Initialize => Op::Init,
            Transition::Start => Op::Serve,
            Transition::Stop => Op::Stop,
        }
    }

    fn accepts(&self, current: State) -> bool {
        match self {
            Transition::Initialize => matches!(current, State::Uninitialized | State::Error),
            Transition::Start => current == State::Initialized,
            Transition::Stop => matches!(current, State::Started | State::Error),
        }
    }

    fn in_progress(&self) -> State {
        match self {
            Transition::Initialize => State::Initializing,
            Transition::Start => State::Starting,
            Transition::Stop => State::Stopping,
        }
    }

    fn done(&self) -> State {
        match self {
            Transition::Initialize => State::Initialized,
            Transition::Start => State::Started,
            Transition::Stop => State::Stopped,
        }
    }
}

pub(crate) struct Fsm {
    lock: Mutex<()>,
    state: AtomicState,
    bus: Bus,
}

impl Fsm {
    pub(crate) fn new(bus: Bus) -> Self {
        Self {
            lock: Mutex::new(()),
            state: AtomicState::default(),
            bus,
        }
    }

    #[inline]
    pub(crate) fn state(&self) -> State {
        self.state.load()
    }

    /// Holds the transition lock without changing state.
    pub(crate) async fn hold(&self) -> MutexGuard<'_, ()> {
        self.lock.lock().await
    }

    /// Fires `transition`, running `body` between the "-ing" and the terminal state.
    pub(crate) async fn fire<T, Fut>(&self, transition: Transition, body: Fut) -> Result<T, ContainerError>
    where
        Fut: Future<Output = Result<T, ContainerError>>,
    {
        let _guard = self.lock.lock().await;

        let current = self.state.load();
        if !transition.accepts(current) {
            return Err(ContainerError::InvalidState {
                op: transition.op(),
                source: StateError {
                    current,
                    requested: transition.name(),
                },
            });
        }

        self.set(transition.in_progress());
        match body.await {
            Ok(v) => {
                self.set(transition.done());
                Ok(v)
            }
            Err(e) => {
                tracing::error!(event = transition.name(), error = %e, "container transition failed");
                self.set(State::Error);
                Err(e)
            }
        }
    }

    fn set(&self, state: State) {
        self.state.store(state);
        tracing::debug!(state = %state, "container state");
        self.bus
            .publish(Event::new(EventKind::StateChanged).with_state(state));
    }
}
