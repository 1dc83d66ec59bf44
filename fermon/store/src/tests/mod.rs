mod ring_test;
