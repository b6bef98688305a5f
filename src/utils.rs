#[macro_export]
macro_rules! is_power_of_2 {
    ($x:expr) => {
        ($x) != 0 && ($x) & (($x) - 1) == 0
    };
}

#[cfg(test)]
#[test]
fn test_is_power_of_2() {
    crate::tests_init();

    assert!(!is_power_of_2!(0));
    assert!(!is_power_of_2!(7));
    assert!(is_power_of_2!(8));
    assert!(is_power_of_2!(512));
    assert!(!is_power_of_2!(513));
    assert!(is_power_of_2!(4096));
}
