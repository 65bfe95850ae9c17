pub(crate) mod processor;
pub(crate) mod swap_chain;
