pub(crate) mod artifact;
pub(crate) mod daemon;
pub(crate) mod import;
pub(crate) mod link;
pub(crate) mod meta;
pub(crate) mod migrate;
pub(crate) mod shared;
pub(crate) mod status;
pub(crate) mod sync;
pub(crate) mod update;
