pub(crate) mod alerts;
pub(crate) mod attendance;
pub(crate) mod cases;
pub(crate) mod dashboard;
pub(crate) mod errors;
pub(crate) mod guards;
pub(crate) mod handlers;
pub(crate) mod pagination;
pub(crate) mod roster;
pub(crate) mod router;
pub(crate) mod students;
pub(crate) mod users;
