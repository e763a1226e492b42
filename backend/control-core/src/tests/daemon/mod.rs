mod discovery;
mod probe;
mod supervisor;
