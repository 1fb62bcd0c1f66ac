use fantasia_domain::InputEvent;
use ringbuf::{HeapConsumer, HeapProducer, HeapRb};
use tracing::warn;

/// Creates the single-producer queue that carries notes from a controller into the engine.
pub fn input_channel(capacity: usize) -> (InputSender, InputQueue) {
    let (producer, consumer) = HeapRb::<InputEvent>::new(capacity.max(1)).split();
    (InputSender { producer }, InputQueue { consumer })
}

/// Write side; may live on a MIDI callback thread.
pub struct InputSender {
    producer: HeapProducer<InputEvent>,
}

impl InputSender {
    /// Queues a note. Returns `false` and drops the note when the queue is full.
    pub fn push_note(&mut self, note: i32, timestamp_ms: f64) -> bool {
        self.push(InputEvent::new(note, timestamp_ms))
    }

    pub fn push(&mut self, event: InputEvent) -> bool {
        match self.producer.push(event) {
            Ok(()) => true,
            Err(dropped) => {
                warn!(note = dropped.note, "input queue full, dropping note");
                false
            }
        }
    }
}

/// Read side, drained by the engine once per tick.
pub struct InputQueue {
    consumer: HeapConsumer<InputEvent>,
}

impl InputQueue {
    pub fn drain(&mut self) -> Vec<InputEvent> {
        self.consumer.pop_iter().collect()
    }

    pub fn len(&self) -> usize {
        self.consumer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.consumer.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn notes_arrive_in_order() {
        let (mut tx, mut rx) = input_channel(8);
        assert!(tx.push_note(60, 1.0));
        assert!(tx.push_note(64, 2.0));
        assert_eq!(rx.len(), 2);
        let notes: Vec<i32> = rx.drain().into_iter().map(|e| e.note).collect();
        assert_eq!(notes, vec![60, 64]);
        assert!(rx.is_empty());
    }

    #[test]
    fn full_queue_drops_notes() {
        let (mut tx, mut rx) = input_channel(2);
        assert!(tx.push_note(60, 0.0));
        assert!(tx.push_note(62, 0.0));
        assert!(!tx.push_note(64, 0.0));
        assert_eq!(rx.drain().len(), 2);
        assert!(tx.push_note(64, 0.0));
    }

    #[test]
    fn sender_works_across_threads() {
        let (mut tx, mut rx) = input_channel(16);
        let handle = std::thread::spawn(move || {
            for note in 0..4 {
                tx.push_note(60 + note, note as f64);
            }
        });
        handle.join().unwrap();
        assert_eq!(rx.drain().len(), 4);
    }
}
