use std::env;

fn main() {
    // The link script only applies to the bare-metal target.
    let target = env::var("TARGET").unwrap_or_default();
    if target.starts_with("riscv64") {
        let dir = env::var("CARGO_MANIFEST_DIR").unwrap();
        println!("cargo:rustc-link-arg=-T{dir}/zsbl.ld");
    }
    println!("cargo:rerun-if-changed=zsbl.ld");
}
