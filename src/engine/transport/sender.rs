use super::RemoteTransport;
use crate::engine::error::Result;
use crate::engine::tuple::Tuple;
use log::debug;
use parking_lot::Mutex;
use std::sync::Arc;

/// Remote destination of one stream on one peer worker.
///
/// With a batch size above one, data tuples are buffered and flushed when the
/// buffer fills; an end-of-stream tuple always flushes the buffer with the EOS
/// appended, so a source's data is delivered before its EOS. The buffer lock
/// is held across the push to keep that order between concurrent producers.
pub struct SenderBolt {
    address: String,
    job_id: String,
    stream: String,
    batch_size: usize,
    buffer: Mutex<Vec<Tuple>>,
    transport: Arc<dyn RemoteTransport>,
}

impl SenderBolt {
    pub fn new(
        address: impl Into<String>,
        job_id: impl Into<String>,
        stream: impl Into<String>,
        batch_size: usize,
        transport: Arc<dyn RemoteTransport>,
    ) -> Self {
        let batch_size = batch_size.max(1);
        Self {
            address: address.into(),
            job_id: job_id.into(),
            stream: stream.into(),
            batch_size,
            buffer: Mutex::new(Vec::with_capacity(batch_size)),
            transport,
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn send(&self, tuple: &Tuple) -> Result<()> {
        let mut buffer = self.buffer.lock();

        if self.batch_size == 1 {
            debug!("Push {} -> {}", self.stream, self.address);
            return self
                .transport
                .push(&self.address, &self.job_id, &self.stream, tuple);
        }

        buffer.push(tuple.clone());
        if tuple.is_end_of_stream() || buffer.len() >= self.batch_size {
            let batch = std::mem::take(&mut *buffer);
            debug!(
                "Push batch of {} {} -> {}",
                batch.len(),
                self.stream,
                self.address
            );
            self.transport
                .push_batch(&self.address, &self.job_id, &self.stream, &batch)?;
        }
        Ok(())
    }

    pub fn buffered(&self) -> usize {
        self.buffer.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::tuple::{ExecutorId, Fields, Value};

    #[derive(Default)]
    struct Batches {
        calls: Mutex<Vec<Vec<Tuple>>>,
    }

    impl RemoteTransport for Batches {
        fn push(&self, _address: &str, _job: &str, _stream: &str, tuple: &Tuple) -> Result<()> {
            self.calls.lock().push(vec![tuple.clone()]);
            Ok(())
        }

        fn push_batch(&self, _address: &str, _job: &str, _stream: &str, tuples: &[Tuple]) -> Result<()> {
            self.calls.lock().push(tuples.to_vec());
            Ok(())
        }
    }

    fn data(n: usize) -> Tuple {
        Tuple::new(
            Fields::new(["key"]),
            vec![Value::from(n.to_string())],
            ExecutorId::from("src"),
        )
        .unwrap()
    }

    #[test]
    fn test_batches_flush_when_full() {
        let transport = Arc::new(Batches::default());
        let sender = SenderBolt::new("http://w", "job", "s", 3, transport.clone());

        for n in 0..7 {
            sender.send(&data(n)).unwrap();
        }
        let sizes: Vec<usize> = transport.calls.lock().iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![3, 3]);
        assert_eq!(sender.buffered(), 1);
    }

    #[test]
    fn test_eos_flushes_after_data() {
        let transport = Arc::new(Batches::default());
        let sender = SenderBolt::new("http://w", "job", "s", 10, transport.clone());

        sender.send(&data(1)).unwrap();
        sender.send(&data(2)).unwrap();
        sender
            .send(&Tuple::end_of_stream(ExecutorId::from("src")))
            .unwrap();

        let calls = transport.calls.lock();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].len(), 3);
        assert!(calls[0][2].is_end_of_stream());
        assert_eq!(sender.buffered(), 0);
    }

    #[test]
    fn test_unbatched_pushes_each_tuple() {
        let transport = Arc::new(Batches::default());
        let sender = SenderBolt::new("http://w", "job", "s", 1, transport.clone());
        sender.send(&data(1)).unwrap();
        sender.send(&data(2)).unwrap();
        assert_eq!(transport.calls.lock().len(), 2);
        assert_eq!(sender.buffered(), 0);
    }
}
