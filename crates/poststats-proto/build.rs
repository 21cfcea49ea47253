// Generates the StatsService client, server and message types from
// proto/poststats.proto at compile time.

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("cargo:rerun-if-changed=proto/poststats.proto");
    tonic_build::compile_protos("proto/poststats.proto")?;
    Ok(())
}
