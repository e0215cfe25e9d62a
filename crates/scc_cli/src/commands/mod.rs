pub(crate) mod meta;
pub(crate) mod source;
