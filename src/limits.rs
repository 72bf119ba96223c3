pub const MAX_SCHEDULES: usize = 100_000;
pub const MAX_COURSES: usize = 50_000;
pub const MAX_INSTRUCTORS: usize = 50_000;

pub const MAX_CLASSROOM_LEN: usize = 64;
pub const MAX_NAME_LEN: usize = 128;
