//! Cross-crate scenarios for the Mangrove client.


#[cfg(test)]
mod unit;
