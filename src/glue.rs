//! Runtime glue (C16): the generated wiring a component-model codegen would
//! emit for variable/array/queue ports. Disable-interrupts critical
//! sections live only here, guarding reader/writer races between the
//! scheduler loop and ISRs (§4.12) — each region is a plain field copy, far
//! under the "one byte of serial transmission" budget §4.12 sets.

use critical_section::Mutex;
use core::cell::Cell;

/// A single-value port shared between exactly one ISR-side writer and the
/// scheduler-side reader (or vice versa). `Cell` is sound here because both
/// sides only ever touch it from inside `critical_section::with`.
pub struct VariablePort<T: Copy> {
    cell: Mutex<Cell<T>>,
}

impl<T: Copy> VariablePort<T> {
    pub const fn new(initial: T) -> Self {
        Self {
            cell: Mutex::new(Cell::new(initial)),
        }
    }

    pub fn write(&self, value: T) {
        critical_section::with(|cs| self.cell.borrow(cs).set(value));
    }

    pub fn read(&self) -> T {
        critical_section::with(|cs| self.cell.borrow(cs).get())
    }
}

/// Fixed-size array port, same sharing discipline as `VariablePort` but
/// indexed.
pub struct ArrayPort<T: Copy, const N: usize> {
    cells: [Mutex<Cell<T>>; N],
}

impl<T: Copy, const N: usize> ArrayPort<T, N> {
    pub fn filled_with(initial: T) -> Self {
        Self {
            cells: core::array::from_fn(|_| Mutex::new(Cell::new(initial))),
        }
    }

    pub fn write(&self, index: usize, value: T) {
        critical_section::with(|cs| self.cells[index].borrow(cs).set(value));
    }

    pub fn read(&self, index: usize) -> T {
        critical_section::with(|cs| self.cells[index].borrow(cs).get())
    }
}

/// Outcome of a queue-port consumer read (§3 "Bounded queue").
#[derive(Debug, Clone, Copy, PartialEq, Eq, defmt::Format)]
pub enum QueueReadResult<T> {
    Empty,
    Ok(T),
    Overflow(T),
}

/// Thin adapter wiring `crate::queue::Queue` behind the same
/// critical-section discipline as the other glue ports, for queues shared
/// between an ISR producer and the scheduler-task consumer.
pub struct QueuePort<T: Copy, const N: usize> {
    inner: Mutex<core::cell::RefCell<crate::queue::Queue<T, N>>>,
}

impl<T: Copy + Default, const N: usize> Default for QueuePort<T, N> {
    fn default() -> Self {
        Self {
            inner: Mutex::new(core::cell::RefCell::new(crate::queue::Queue::new())),
        }
    }
}

impl<T: Copy + Default, const N: usize> QueuePort<T, N> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Called from the ISR producer.
    pub fn push(&self, value: T) {
        critical_section::with(|cs| {
            self.inner.borrow(cs).borrow_mut().push(value);
        });
    }

    /// Called from the scheduler-task consumer.
    pub fn pop(&self) -> QueueReadResult<T> {
        critical_section::with(|cs| match self.inner.borrow(cs).borrow_mut().pop() {
            crate::queue::ReadResult::Empty => QueueReadResult::Empty,
            crate::queue::ReadResult::Ok(v) => QueueReadResult::Ok(v),
            crate::queue::ReadResult::Overflow(v) => QueueReadResult::Overflow(v),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn variable_port_roundtrips() {
        let port: VariablePort<u32> = VariablePort::new(0);
        port.write(42);
        assert_eq!(port.read(), 42);
    }

    #[test]
    fn array_port_indexes_independently() {
        let port: ArrayPort<u8, 4> = ArrayPort::filled_with(0);
        port.write(1, 7);
        assert_eq!(port.read(0), 0);
        assert_eq!(port.read(1), 7);
    }

    #[test]
    fn queue_port_roundtrips_through_critical_sections() {
        let port: QueuePort<u8, 4> = QueuePort::new();
        port.push(1);
        port.push(2);
        assert_eq!(port.pop(), QueueReadResult::Ok(1));
        assert_eq!(port.pop(), QueueReadResult::Ok(2));
        assert_eq!(port.pop(), QueueReadResult::Empty);
    }
}
