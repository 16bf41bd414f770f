pub mod job;
pub mod task;
pub mod wordcount;
pub mod worker;

pub use job::{is_valid_job_id, JobId, JobState, JobStatus, SubmitFileRequest, SubmitTextRequest};
pub use task::{CountsResponse, MapRequest, ReduceRequest, UploadQuery, UploadResponse};
pub use wordcount::Counts;
pub use worker::{
    WorkerAddr, WorkerHeartbeatRequest, WorkerHeartbeatResponse, WorkerRegisterRequest,
    WorkerRegisterResponse, WorkerView,
};
