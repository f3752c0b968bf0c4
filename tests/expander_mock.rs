#![cfg(not(feature = "async"))]

use core::convert::Infallible;

use embedded_hal::i2c::ErrorKind;
use embedded_hal_mock::eh1::i2c::{Mock as I2cMock, Transaction as I2cTrans};
use expander_supervisor::error::Error;
use expander_supervisor::expander::Pca9539;

const ADDR: u8 = 0x74;

fn opener(mock: I2cMock) -> impl FnMut() -> Result<I2cMock, Infallible> {
    move || Ok(mock.clone())
}

/// Write both registers of a pair, then read both back.
fn pair(r0: u8, r1: u8, wrote: (u8, u8), read: (u8, u8)) -> Vec<I2cTrans> {
    vec![
        I2cTrans::write(ADDR, vec![r0, wrote.0]),
        I2cTrans::write(ADDR, vec![r1, wrote.1]),
        I2cTrans::write_read(ADDR, vec![r0], vec![read.0]),
        I2cTrans::write_read(ADDR, vec![r1], vec![read.1]),
    ]
}

fn init_ok() -> Vec<I2cTrans> {
    let mut t = pair(0x04, 0x05, (0, 0), (0, 0));
    t.extend(pair(0x06, 0x07, (0, 0), (0, 0)));
    t.extend(pair(0x02, 0x03, (0, 0), (0, 0)));
    t
}

#[test]
fn init_programs_and_verifies_all_six_registers() {
    let mut mock = I2cMock::new(&init_ok());
    let mut expander = Pca9539::new(opener(mock.clone()));
    assert!(expander.init_device());
    assert!(expander.is_initialized());
    assert_eq!(expander.output_mask(), 0x0000);
    mock.done();
}

#[test]
fn init_readback_mismatch_leaves_device_uninitialized() {
    let mut exp = pair(0x04, 0x05, (0, 0), (0, 0));
    exp.extend(pair(0x06, 0x07, (0, 0), (0x00, 0xFF)));
    // the output pair is still programmed so every readback gets logged
    exp.extend(pair(0x02, 0x03, (0, 0), (0, 0)));
    let mut mock = I2cMock::new(&exp);
    let mut expander = Pca9539::new(opener(mock.clone()));

    let err = expander.try_init_device().unwrap_err();
    assert!(matches!(err, Error::VerifyMismatch { register: 0x07, wrote: 0x00, read: 0xFF }));
    assert!(!expander.is_initialized());
    mock.done();
}

#[test]
fn init_reports_the_first_mismatching_register_after_all_pairs() {
    let mut exp = pair(0x04, 0x05, (0, 0), (0x10, 0x00));
    exp.extend(pair(0x06, 0x07, (0, 0), (0x00, 0xFF)));
    exp.extend(pair(0x02, 0x03, (0, 0), (0, 0)));
    let mut mock = I2cMock::new(&exp);
    let mut expander = Pca9539::new(opener(mock.clone()));

    let err = expander.try_init_device().unwrap_err();
    assert!(matches!(err, Error::VerifyMismatch { register: 0x04, wrote: 0x00, read: 0x10 }));
    assert!(!expander.is_initialized());
    mock.done();
}

#[test]
fn set_outputs_splits_mask_across_ports() {
    let mut exp = init_ok();
    // No. 1 -> P00, No. 16 -> P17
    exp.extend(pair(0x02, 0x03, (0x01, 0x80), (0x01, 0x80)));
    let mut mock = I2cMock::new(&exp);
    let mut expander = Pca9539::new(opener(mock.clone()));
    assert!(expander.init_device());
    assert!(expander.set_outputs(0x8001));
    assert_eq!(expander.output_mask(), 0x8001);
    mock.done();
}

#[test]
fn output_verify_mismatch_keeps_previous_mask() {
    let mut exp = init_ok();
    exp.extend(pair(0x02, 0x03, (0x0F, 0x00), (0x0F, 0x00)));
    exp.extend(pair(0x02, 0x03, (0xF0, 0x01), (0xF0, 0x00)));
    let mut mock = I2cMock::new(&exp);
    let mut expander = Pca9539::new(opener(mock.clone()));
    assert!(expander.init_device());
    assert!(expander.set_outputs(0x000F));
    assert!(!expander.set_outputs(0x01F0));
    assert_eq!(expander.output_mask(), 0x000F);
    mock.done();
}

#[test]
fn outputs_refused_before_init() {
    let mut mock = I2cMock::new(&[]);
    let mut expander = Pca9539::new(opener(mock.clone()));
    assert!(!expander.set_outputs(0x0001));
    assert!(matches!(expander.try_set_outputs(0x0001), Err(Error::NotInitialized)));
    assert_eq!(expander.output_mask(), 0x0000);
    mock.done();
}

#[test]
fn shutdown_closes_bus_even_when_zeroing_fails() {
    let mut exp = init_ok();
    exp.push(I2cTrans::write(ADDR, vec![0x02, 0x00]).with_error(ErrorKind::Other));
    let mut mock = I2cMock::new(&exp);
    let mut expander = Pca9539::new(opener(mock.clone()));
    assert!(expander.init_device());

    expander.shutdown_safe();
    assert!(!expander.is_open());
    assert!(!expander.is_initialized());

    // second call has no bus to touch
    expander.shutdown_safe();
    assert!(!expander.set_outputs(0x0001));
    mock.done();
}

#[test]
fn shutdown_zeroes_both_ports() {
    let mut exp = init_ok();
    exp.push(I2cTrans::write(ADDR, vec![0x02, 0x00]));
    exp.push(I2cTrans::write(ADDR, vec![0x03, 0x00]));
    let mut mock = I2cMock::new(&exp);
    let mut expander = Pca9539::new(opener(mock.clone()));
    assert!(expander.init_device());
    expander.shutdown_safe();
    assert!(!expander.is_open());
    mock.done();
}

#[test]
fn init_after_shutdown_reopens_the_bus() {
    let mut exp = init_ok();
    exp.push(I2cTrans::write(ADDR, vec![0x02, 0x00]));
    exp.push(I2cTrans::write(ADDR, vec![0x03, 0x00]));
    exp.extend(init_ok());
    let mut mock = I2cMock::new(&exp);
    let mut expander = Pca9539::new(opener(mock.clone()));
    assert!(expander.init_device());
    expander.shutdown_safe();
    assert!(expander.init_device());
    assert!(expander.is_open());
    mock.done();
}

#[test]
fn open_failure_is_bus_unavailable() {
    let mut expander = Pca9539::new(|| Err::<I2cMock, _>("no /dev/i2c-1"));
    assert!(matches!(expander.try_init_device(), Err(Error::BusUnavailable)));
    assert!(!expander.init_device());
    assert!(!expander.is_open());
}

#[test]
fn custom_address_is_used_on_the_wire() {
    let exp = [I2cTrans::write_read(0x75, vec![0x00], vec![0xA5])];
    let mut mock = I2cMock::new(&exp);
    let mut expander = Pca9539::with_address(opener(mock.clone()), 0x75);
    expander.open().unwrap();
    assert_eq!(expander.read_reg(0x00).unwrap(), 0xA5);
    mock.done();
}
