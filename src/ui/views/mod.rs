pub mod dashboard;
pub mod employees;
pub mod task_detail;
pub mod tasks;
