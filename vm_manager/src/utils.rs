#[cfg(test)]
pub mod test_utilities;
