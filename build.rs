fn main() {
    println!("cargo:rerun-if-changed=components/bsec_glue");

    #[cfg(feature = "espidf")]
    embuild::espidf::sysenv::output();
}
