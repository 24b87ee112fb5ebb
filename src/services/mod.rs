pub(crate) mod alerts;
pub(crate) mod attendance;
pub(crate) mod cases;
pub(crate) mod dashboard;
pub(crate) mod dashboard_cache;
pub(crate) mod errors;
pub(crate) mod history;
pub(crate) mod policy;
pub(crate) mod risk;
pub(crate) mod roster;
