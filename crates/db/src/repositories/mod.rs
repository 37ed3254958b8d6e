pub mod job_repo;
pub mod scene_repo;

pub use job_repo::JobRepo;
pub use scene_repo::SceneRepo;
