pub mod jwt;
#[cfg(test)]
pub mod test_token;

pub use jwt::{verify_jwt, Claims};
