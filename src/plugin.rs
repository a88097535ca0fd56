use crate::{callbacks::Callbacks, error::Error};

/// An extension attached to a [`Db`](crate::Db) through its callback chains.
pub trait Plugin: Send + Sync + 'static {
    fn name(&self) -> &str;

    fn initialize(&self, callbacks: &mut Callbacks) -> Result<(), Error>;
}
