fn main() {
    #[cfg(feature = "sp1")]
    sp1_helper::build_program("../zkkv-program");
}
