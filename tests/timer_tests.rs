//! Integration tests for the per-unit timer bank

use std::thread;

use irq_io::{hal::MockTimer, IrqToken, TimerBank, TimerReaction, TimerUnit};

fn mark_unit(bank: &TimerBank<MockTimer>, unit: TimerUnit, token: IrqToken) {
    bank.hal().record_mark(unit.index() * 10 + token.index());
}

#[test]
fn concurrent_first_use_builds_one_cell() {
    let bank = TimerBank::leak(MockTimer::new());

    let handles: Vec<_> = (0..8)
        .map(|i| thread::spawn(move || bank.timer_with_flags(TimerUnit::Group1Timer1, i)))
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
    assert_eq!(bank.constructed_count(), 1);

    // Whichever thread won, every handle shares its flags
    let timer = bank.timer(TimerUnit::Group1Timer1);
    timer.initialize(10).unwrap();
    let flags = bank.hal().intr_flags(TimerUnit::Group1Timer1).unwrap();
    assert!((0..8).contains(&flags));
}

#[test]
fn units_alarm_independently() {
    let bank = TimerBank::leak(MockTimer::new());
    let fast = bank.timer(TimerUnit::Group0Timer0);
    let slow = bank.timer(TimerUnit::Group1Timer0);

    fast.initialize(10).unwrap();
    slow.initialize(40).unwrap();
    fast.set_reaction(TimerReaction::new(mark_unit, IrqToken::new(1)));
    slow.set_reaction(TimerReaction::new(mark_unit, IrqToken::new(2)));
    fast.start();
    slow.start();

    for _ in 0..4 {
        bank.hal().advance(TimerUnit::Group0Timer0, 400);
        bank.hal().advance(TimerUnit::Group1Timer0, 400);
    }

    assert_eq!(fast.alarm_count(), 4);
    assert_eq!(slow.alarm_count(), 1);
    let marks = bank.hal().marks();
    assert_eq!(marks.iter().filter(|&&m| m == 1).count(), 4);
    assert_eq!(marks.iter().filter(|&&m| m == 22).count(), 1);
}

#[test]
fn reinitialize_after_deinitialize() {
    let bank = TimerBank::leak(MockTimer::new());
    let timer = bank.timer(TimerUnit::Group0Timer1);

    timer.initialize(100).unwrap();
    timer.deinitialize();
    assert!(!timer.is_initialized());

    timer.initialize(200).unwrap();
    assert!(timer.is_initialized());
    assert_eq!(bank.hal().alarm(TimerUnit::Group0Timer1), 8000);
    assert!(bank.hal().isr_installed(TimerUnit::Group0Timer1));
}
