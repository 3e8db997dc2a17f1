pub(crate) mod map;
mod raw;
