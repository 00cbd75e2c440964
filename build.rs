fn main() {
    // Forward the ESP-IDF link arguments and cfgs; a no-op for host builds.
    embuild::espidf::sysenv::output();
}
