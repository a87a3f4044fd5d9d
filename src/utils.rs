use std::time::{Instant, Duration};
use std::sync::Arc;
use std::sync::mpsc;
use std::thread;
use parking_lot::Mutex;

/// Timestamps messages and hands them to a collector thread that appends
/// them to the shared log shown in the GUI.
#[derive(Clone)]
pub struct Logger {
    sender: mpsc::Sender<String>,
}

impl Logger {
    pub fn new(log_messages: Arc<Mutex<Vec<String>>>) -> Self {
        let (sender, receiver) = mpsc::channel();

        thread::Builder::new()
            .name("log-collector".to_string())
            .spawn(move || {
                for message in receiver {
                    log_messages.lock().push(message);
                }
            })
            .map_err(|e| eprintln!("Failed to start log collector: {}", e))
            .ok();

        Logger { sender }
    }

    pub fn log(&self, message: impl AsRef<str>) {
        let timestamp = chrono::Local::now().format("%H:%M:%S%.3f");
        let log_message = format!("[{}] {}", timestamp, message.as_ref());
        // The collector only goes away on shutdown.
        self.sender.send(log_message).unwrap_or_default();
    }
}

pub fn measure_time<F, T>(f: F) -> (T, Duration)
where
    F: FnOnce() -> T,
{
    let start = Instant::now();
    let result = f();
    let duration = start.elapsed();
    (result, duration)
}

pub fn get_memory_usage() -> String {
    if let Ok(mem_info) = sys_info::mem_info() {
        format!(
            "Memory: Total: {} MB, Free: {} MB, Used: {} MB",
            mem_info.total / 1024,
            mem_info.free / 1024,
            mem_info.total.saturating_sub(mem_info.free) / 1024
        )
    } else {
        "Unable to get memory info".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn logger_prefixes_a_timestamp() {
        let messages = Arc::new(Mutex::new(Vec::new()));
        let logger = Logger::new(messages.clone());
        logger.log("image selected");

        let deadline = Instant::now() + Duration::from_secs(5);
        while messages.lock().is_empty() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }

        let messages = messages.lock();
        assert_eq!(messages.len(), 1);
        assert!(messages[0].starts_with('['));
        assert!(messages[0].ends_with("] image selected"));
    }

    #[test]
    fn measure_time_returns_the_result() {
        let (value, duration) = measure_time(|| 21 * 2);
        assert_eq!(value, 42);
        assert!(duration < Duration::from_secs(5));
    }
}
