#[cfg(unix)]
mod supervisor;
