mod process_worker;

pub use process_worker::ProcessWorker;
