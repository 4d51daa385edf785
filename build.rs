fn main() {
    if !cfg!(target_os = "linux") {
        panic!(
            "{} only works on linux (listener shutdown must wake a blocked accept)",
            env!("CARGO_PKG_NAME")
        );
    }
}
