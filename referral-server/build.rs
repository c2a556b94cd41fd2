fn main() {
    built::write_built_file().expect("Failed to acquire build-time information");

    // Deploy pipelines that build outside a git checkout pass the revision in explicitly
    println!("cargo:rerun-if-env-changed=REFERRAL_DESK_GIT_HASH");
    if let Ok(hash) = std::env::var("REFERRAL_DESK_GIT_HASH") {
        println!("cargo:rustc-env=REFERRAL_DESK_GIT_HASH={}", hash);
    }
}
