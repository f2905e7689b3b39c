pub mod device;
pub mod step;
pub mod storage_object;
pub mod trail;
