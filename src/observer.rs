use log::{info, warn};

use crate::types::InvocationResponse;

/// Receives every [`InvocationResponse`] the controller emits, in completion
/// order. Implementations must not block for long: dispatch to observers is
/// serialized behind a single fan-out task.
pub trait Observer: Send + Sync {
    fn on_response(&self, response: &InvocationResponse);
}

/// Logs a one-line summary of each response. Registered automatically when
/// `print-response` is configured.
pub struct ResponsePrinter {
    pub print_body: bool,
}

impl Observer for ResponsePrinter {
    fn on_response(&self, response: &InvocationResponse) {
        if let Some(error) = &response.error {
            warn!(
                "connector-sdk got error: topic={} function={} error={error}",
                response.topic, response.function
            );
            return;
        }

        let status = response.status.unwrap_or(0);
        let body_len = response.body.as_ref().map(Vec::len).unwrap_or(0);

        if self.print_body {
            let body = response
                .body
                .as_deref()
                .map(String::from_utf8_lossy)
                .unwrap_or_default();
            info!(
                "connector-sdk got result: [{status}] {} => {} ({body_len} bytes) {body}",
                response.topic, response.function
            );
        } else {
            info!(
                "connector-sdk got result: [{status}] {} => {} ({body_len} bytes)",
                response.topic, response.function
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;

    struct RecordingObserver {
        seen: Mutex<Vec<String>>,
    }

    impl Observer for RecordingObserver {
        fn on_response(&self, response: &InvocationResponse) {
            self.seen.lock().unwrap().push(response.function.clone());
        }
    }

    #[test]
    fn response_printer_does_not_panic_on_error_responses() {
        let printer = ResponsePrinter { print_body: true };
        let response = InvocationResponse::error(
            None,
            "topic1",
            "echo",
            "boom",
            Duration::from_millis(5),
        );
        printer.on_response(&response);
    }

    #[test]
    fn custom_observer_receives_responses() {
        let observer = RecordingObserver {
            seen: Mutex::new(Vec::new()),
        };
        let response = InvocationResponse::success(
            None,
            "topic1",
            "echo",
            200,
            b"ok".to_vec(),
            Default::default(),
            Duration::from_millis(5),
        );
        observer.on_response(&response);
        assert_eq!(*observer.seen.lock().unwrap(), vec!["echo".to_string()]);
    }
}
