fn main() {
    growlux::run()
}
