pub(crate) mod alerts;
pub(crate) mod attendance;
pub(crate) mod case_notes;
pub(crate) mod cases;
pub(crate) mod classrooms;
pub(crate) mod dashboard;
pub(crate) mod enrollments;
pub(crate) mod risk;
pub(crate) mod students;
pub(crate) mod subjects;
pub(crate) mod users;
