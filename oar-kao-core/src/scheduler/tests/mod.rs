mod dependencies_test;
mod platform_mock;
mod slotset_test;
