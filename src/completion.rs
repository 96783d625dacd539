//! Non-local transfer of control (spec §4.3).

use crate::value::Value;

#[derive(Clone, Debug)]
pub enum Completion {
    Normal,
    Break(Option<String>),
    Continue(Option<String>),
    Return(Value),
    Throw(Value),
}

impl Completion {
    pub fn is_normal(&self) -> bool {
        matches!(self, Completion::Normal)
    }

    pub fn is_abrupt(&self) -> bool {
        !self.is_normal()
    }
}
