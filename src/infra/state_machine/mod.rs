//! Generic byte-driven finite state machine engine.
//!
//! A decoder is assembled from a set of [`State`] handlers, each identified by an `Id`.
//! The engine holds the current identity, feeds every input byte to the matching
//! handler's [`State::tick`], then follows the returned identity through
//! [`State::exit`]/[`State::enter`] until it stabilizes. `enter` may redirect
//! immediately, which gives zero-byte cascades such as "idle" routing straight into
//! "dispatch" and back.
//!
//! Transition targets are declared by each state ([`State::targets`]) and validated
//! when the machine is built, so a dangling transition is a construction error rather
//! than a runtime surprise. The engine is not protocol-aware.
use crate::error::StateMachineError;
use heapless::Vec;

//==================================================================================STATE
/// One state of a byte-stream decoder.
pub trait State<Id, Out> {
    /// Identity under which the state is registered.
    fn id(&self) -> Id;

    /// Every identity [`State::tick`] or [`State::enter`] may return, besides `id()`.
    fn targets(&self) -> &[Id];

    /// Called on transition into the state. Returning another identity redirects
    /// without consuming a byte.
    fn enter(&mut self) -> Id {
        self.id()
    }

    /// Consume one input byte; returns the next identity and the side output.
    fn tick(&mut self, byte: u8) -> (Id, Out);

    /// Called on transition out of the state.
    fn exit(&mut self) {}
}

//==================================================================================BUILDER
/// Collects states before validation.
pub struct StateMachineBuilder<'a, Id, Out, const N: usize> {
    initial: Id,
    states: Vec<&'a mut dyn State<Id, Out>, N>,
    overflow: bool,
}

impl<'a, Id, Out, const N: usize> StateMachineBuilder<'a, Id, Out, N>
where
    Id: Copy + PartialEq,
{
    /// Register a state.
    pub fn with(mut self, state: &'a mut dyn State<Id, Out>) -> Self {
        if self.states.push(state).is_err() {
            self.overflow = true;
        }
        self
    }

    /// Validate the registry and build the machine positioned on the initial state.
    pub fn build(self) -> Result<StateMachine<'a, Id, Out, N>, StateMachineError> {
        if self.overflow {
            return Err(StateMachineError::Capacity);
        }

        for (i, state) in self.states.iter().enumerate() {
            let id = state.id();
            if self.states[i + 1..].iter().any(|other| other.id() == id) {
                return Err(StateMachineError::DuplicateState);
            }
        }

        let current = self
            .states
            .iter()
            .position(|s| s.id() == self.initial)
            .ok_or(StateMachineError::UnknownInitial)?;

        for state in self.states.iter() {
            for target in state.targets() {
                if !self.states.iter().any(|s| s.id() == *target) {
                    return Err(StateMachineError::UnknownTarget);
                }
            }
        }

        Ok(StateMachine {
            states: self.states,
            current,
        })
    }
}

//==================================================================================MACHINE
/// Validated state machine over at most `N` borrowed states.
pub struct StateMachine<'a, Id, Out, const N: usize> {
    states: Vec<&'a mut dyn State<Id, Out>, N>,
    current: usize,
}

impl<'a, Id, Out, const N: usize> StateMachine<'a, Id, Out, N>
where
    Id: Copy + PartialEq,
{
    /// Start describing a machine whose initial state is `initial`.
    pub fn builder(initial: Id) -> StateMachineBuilder<'a, Id, Out, N> {
        StateMachineBuilder {
            initial,
            states: Vec::new(),
            overflow: false,
        }
    }

    /// Identity of the current state.
    pub fn current(&self) -> Id {
        self.states[self.current].id()
    }

    /// Feed one byte; returns the side output of the state that consumed it.
    pub fn tick(&mut self, byte: u8) -> Out {
        let (mut next, output) = self.states[self.current].tick(byte);
        let mut transitions = 0usize;

        while next != self.states[self.current].id() {
            if transitions >= 2 * N {
                #[cfg(feature = "defmt")]
                defmt::error!("State machine: transition cascade did not settle, stopping");
                break;
            }
            transitions += 1;

            let declared = self.states[self.current].targets().contains(&next);
            let Some(target) = self.index_of(next).filter(|_| declared) else {
                #[cfg(feature = "defmt")]
                defmt::error!("State machine: transition to non-existent state, staying");
                break;
            };

            self.states[self.current].exit();
            self.current = target;
            next = self.states[self.current].enter();
        }

        output
    }

    fn index_of(&self, id: Id) -> Option<usize> {
        self.states.iter().position(|s| s.id() == id)
    }
}
