fn main() {
    hypergrid::cli::run();
}
